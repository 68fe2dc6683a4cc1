//! # Tokenização e Offsets de Caractere
//!
//! Divide o texto em palavras preservando a posição original de cada uma.
//! Todas as posições do anotador são **offsets de caractere** (escalares
//! Unicode), nunca de byte: um documento com "β-catenina" precisa destacar
//! a mesma região no visualizador, que conta caracteres.
//!
//! ## Esquema
//!
//! - O texto é separado por espaços em branco.
//! - Pontuação nas bordas da palavra é descartada ("(TNF)," → "TNF"),
//!   mas pontuação interna é mantida ("IL-2", "Ca2+").
//! - Cada [`Token`] carrega `[lo, hi)` em caracteres, página e retângulos.
//!
//! ## Normalização
//!
//! [`normalize_str`] gera a chave de consulta aos dicionários:
//! minúsculas, sem pontuação ASCII e sem espaços.
//!
//! ```rust
//! use bioner_core::tokenizer::{normalize_str, tokenize};
//!
//! let tokens = tokenize("Mutações em (TP53) causam câncer.");
//! assert_eq!(tokens[2].text, "TP53");
//! assert_eq!(normalize_str("Breast Cancer"), "breastcancer");
//! ```

use serde::{Deserialize, Serialize};

/// Retângulo delimitador no formato `[x1, y1, x2, y2]`.
pub type Rect = [f64; 4];

/// Uma palavra do documento.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Token {
    /// Texto da palavra como aparece no documento.
    pub text: String,
    /// Offset de caractere inicial (inclusivo).
    pub lo: usize,
    /// Offset de caractere final (exclusivo).
    pub hi: usize,
    /// Página de origem (1 para texto puro).
    pub page_number: u32,
    /// Retângulos da palavra no PDF; vazio para texto puro.
    pub rects: Vec<Rect>,
    /// Índice sequencial do token.
    pub index: usize,
}

/// Tokeniza texto puro (página 1, sem retângulos).
pub fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut word: Vec<char> = Vec::new();
    let mut word_lo = 0;

    for (i, ch) in text.chars().enumerate() {
        if ch.is_whitespace() {
            flush_word(&mut tokens, &mut word, word_lo);
        } else {
            if word.is_empty() {
                word_lo = i;
            }
            word.push(ch);
        }
    }
    flush_word(&mut tokens, &mut word, word_lo);

    for (i, token) in tokens.iter_mut().enumerate() {
        token.index = i;
    }
    tokens
}

/// Fecha a palavra corrente, aparando pontuação das bordas.
fn flush_word(tokens: &mut Vec<Token>, word: &mut Vec<char>, word_lo: usize) {
    if word.is_empty() {
        return;
    }
    let start = word.iter().position(|c| c.is_alphanumeric());
    let end = word.iter().rposition(|c| c.is_alphanumeric());
    if let (Some(start), Some(end)) = (start, end) {
        // mantém "+" e "'" finais de íons e primos ("Ca2+", "5'")
        let mut end = end;
        while end + 1 < word.len() && matches!(word[end + 1], '+' | '\'') {
            end += 1;
        }
        tokens.push(Token {
            text: word[start..=end].iter().collect(),
            lo: word_lo + start,
            hi: word_lo + end + 1,
            page_number: 1,
            rects: Vec::new(),
            index: 0, // atribuído depois
        });
    }
    word.clear();
}

/// Chave de consulta: minúsculas, sem pontuação ASCII, sem espaços.
pub fn normalize_str(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_ascii_punctuation() && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Conta palavras como o filtro de falsos positivos espera: por espaço,
/// e por hífen quando não há espaços.
pub fn word_count(s: &str) -> usize {
    let by_space = s.split_whitespace().count();
    if by_space > 1 {
        by_space
    } else {
        s.split('-').filter(|p| !p.is_empty()).count().max(1)
    }
}

/// Tabela de conversão offset de caractere → offset de byte.
///
/// Necessária para fatiar `&str` a partir de offsets de caractere.
#[derive(Debug, Clone)]
pub struct CharOffsets {
    /// Byte inicial de cada caractere, mais o total de bytes no final.
    bytes: Vec<usize>,
}

impl CharOffsets {
    pub fn new(text: &str) -> Self {
        let mut bytes: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
        bytes.push(text.len());
        Self { bytes }
    }

    /// Quantidade de caracteres do texto.
    pub fn char_len(&self) -> usize {
        self.bytes.len() - 1
    }

    /// Byte correspondente ao caractere `idx` (aceita `idx == char_len`).
    pub fn byte(&self, idx: usize) -> Option<usize> {
        self.bytes.get(idx).copied()
    }

    /// Fatia `text[lo..hi)` em caracteres; `None` fora dos limites.
    pub fn slice<'a>(&self, text: &'a str, lo: usize, hi: usize) -> Option<&'a str> {
        if lo > hi {
            return None;
        }
        let start = self.byte(lo)?;
        let end = self.byte(hi)?;
        text.get(start..end)
    }
}
