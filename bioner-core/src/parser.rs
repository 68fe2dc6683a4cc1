//! # Leitura de Documentos
//!
//! Converte a fonte de uma requisição (texto cru ou referência de arquivo)
//! em um [`ParsedDocument`]: o texto completo e a sequência de tokens com
//! offsets de caractere, página e retângulos.
//!
//! A extração de PDF é feita por um serviço externo que grava, para cada
//! documento, um JSON pré-extraído:
//!
//! ```json
//! { "text": "...", "words": [
//!     { "keyword": "TP53", "lo": 0, "hi": 4, "page_number": 1,
//!       "rects": [[10.0, 20.0, 40.0, 30.0]] } ] }
//! ```
//!
//! [`PlainTextParser`] lê esse formato (`<id>.json`) ou texto puro
//! (`<id>.txt`) de um diretório de documentos.

use std::path::PathBuf;

use regex::RegexBuilder;
use serde::Deserialize;

use crate::error::{AnnotationError, Error, Result};
use crate::tokenizer::{tokenize, CharOffsets, Rect, Token};

/// Documento pronto para reconhecimento.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    /// Id do arquivo; `None` para texto cru.
    pub file_id: Option<String>,
    /// Texto completo, inclusive referências.
    pub text: String,
    /// Tokens anotáveis (sem a seção de referências, se excluída).
    pub tokens: Vec<Token>,
}

/// Fonte de tokens.
pub trait DocumentParser: Send + Sync {
    fn parse_text(&self, text: &str, exclude_references: bool) -> Result<ParsedDocument>;

    fn parse_file(&self, file_id: &str, exclude_references: bool) -> Result<ParsedDocument>;
}

#[derive(Debug, Deserialize)]
struct ExtractedWord {
    keyword: String,
    lo: usize,
    hi: usize,
    #[serde(default = "first_page")]
    page_number: u32,
    #[serde(default)]
    rects: Vec<Rect>,
}

fn first_page() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct ExtractedDocument {
    text: String,
    words: Vec<ExtractedWord>,
}

/// Parser de texto puro e de documentos pré-extraídos.
#[derive(Debug, Clone, Default)]
pub struct PlainTextParser {
    document_dir: Option<PathBuf>,
}

impl PlainTextParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            document_dir: Some(dir.into()),
        }
    }

    fn read_extracted(&self, file_id: &str, content: &str) -> Result<(String, Vec<Token>)> {
        let doc: ExtractedDocument = serde_json::from_str(content)
            .map_err(|e| AnnotationError::unparsable(file_id, e.to_string()))?;
        let offsets = CharOffsets::new(&doc.text);
        let mut tokens = Vec::with_capacity(doc.words.len());
        for (index, word) in doc.words.into_iter().enumerate() {
            match offsets.slice(&doc.text, word.lo, word.hi) {
                Some(found) if word.lo < word.hi && found == word.keyword => {}
                _ => {
                    return Err(AnnotationError::unparsable(
                        file_id,
                        format!(
                            "palavra {index} '{}' não corresponde a [{}, {})",
                            word.keyword, word.lo, word.hi
                        ),
                    )
                    .into())
                }
            }
            tokens.push(Token {
                text: word.keyword,
                lo: word.lo,
                hi: word.hi,
                page_number: word.page_number,
                rects: word.rects,
                index,
            });
        }
        Ok((doc.text, tokens))
    }
}

impl DocumentParser for PlainTextParser {
    fn parse_text(&self, text: &str, exclude_references: bool) -> Result<ParsedDocument> {
        let mut tokens = tokenize(text);
        if exclude_references {
            drop_references(text, &mut tokens);
        }
        Ok(ParsedDocument {
            file_id: None,
            text: text.to_string(),
            tokens,
        })
    }

    fn parse_file(&self, file_id: &str, exclude_references: bool) -> Result<ParsedDocument> {
        if file_id.is_empty()
            || file_id.contains(['/', '\\'])
            || file_id == "."
            || file_id == ".."
        {
            return Err(Error::invalid_request(format!("file_id inválido: '{file_id}'")));
        }
        let dir = self
            .document_dir
            .as_ref()
            .ok_or_else(|| Error::invalid_request("nenhum diretório de documentos configurado"))?;

        let json_path = dir.join(format!("{file_id}.json"));
        let txt_path = dir.join(format!("{file_id}.txt"));
        let (text, mut tokens) = if json_path.exists() {
            let content = std::fs::read_to_string(&json_path)?;
            self.read_extracted(file_id, &content)?
        } else if txt_path.exists() {
            let text = std::fs::read_to_string(&txt_path)
                .map_err(|e| AnnotationError::unparsable(file_id, e.to_string()))?;
            let tokens = tokenize(&text);
            (text, tokens)
        } else {
            return Err(AnnotationError::unparsable(file_id, "arquivo não encontrado").into());
        };

        if exclude_references {
            drop_references(&text, &mut tokens);
        }
        Ok(ParsedDocument {
            file_id: Some(file_id.to_string()),
            text,
            tokens,
        })
    }
}

/// Offset de caractere do último cabeçalho de referências, se houver.
pub fn references_cutoff(text: &str) -> Option<usize> {
    let heading = RegexBuilder::new(r"^[ \t]*(references|bibliography|literature cited)[ \t]*:?[ \t]*$")
        .case_insensitive(true)
        .multi_line(true)
        .build()
        .ok()?;
    let byte = heading.find_iter(text).last()?.start();
    Some(text[..byte].chars().count())
}

fn drop_references(text: &str, tokens: &mut Vec<Token>) {
    if let Some(cutoff) = references_cutoff(text) {
        tokens.retain(|t| t.hi <= cutoff);
    }
}
