//! # Motor de Reconhecimento por Dicionário
//!
//! Percorre a sequência de tokens e, para cada tipo habilitado, consulta o
//! dicionário com a chave normalizada de cada janela de palavras
//! contíguas. Produz **candidatos sobrepostos**: o mesmo trecho pode casar
//! com vários tipos, e resolver isso é trabalho do
//! [`IntervalMerger`](crate::merge::IntervalMerger).
//!
//! ## Regras por janela
//!
//! 1. Janelas mais longas primeiro: em "breast cancer" a janela de duas
//!    palavras é tentada antes de "breast".
//! 2. Chaves normalizadas curtas e stop-words nunca são consultadas.
//! 3. Tipos sensíveis a caixa (genes, proteínas) exigem que o texto seja
//!    idêntico ao sinônimo do dicionário.
//! 4. Um texto com mais palavras que o sinônimo é falso positivo da
//!    normalização ("S phase" ≠ "Sphase").
//! 5. Nenhuma janela atravessa uma fronteira de segmento
//!    ([`RecognitionEngine::with_boundaries`]), como o separador entre
//!    células de uma tabela de enriquecimento.
//!
//! ## Regras por documento
//!
//! - **Sinônimo compartilhado**: se um sinônimo pertence a mais de um nome
//!   canônico, só é anotado quando exatamente um desses nomes também
//!   aparece no documento.
//! - **Inclusões globais**: termos do usuário marcados `includeGlobally`
//!   funcionam como um dicionário extra, consultado quando o real não tem
//!   a chave.
//!
//! Cada tipo é varrido em paralelo com `rayon`; os dicionários são
//! somente-leitura.

use std::collections::{HashMap, HashSet};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AnnotatorConfig;
use crate::dictionary::{DictionaryEntry, EntityDictionary};
use crate::entity::EntityType;
use crate::error::{AnnotationError, Result};
use crate::tokenizer::{normalize_str, word_count, CharOffsets, Rect, Token};

/// Uma correspondência ainda não resolvida.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateAnnotation {
    pub entity_type: EntityType,
    /// Texto exatamente como aparece no documento.
    pub text: String,
    /// Offset de caractere inicial (inclusivo).
    pub lo: usize,
    /// Offset de caractere final (exclusivo).
    pub hi: usize,
    pub page_number: u32,
    pub rects: Vec<Rect>,
    /// Entrada escolhida do dicionário.
    pub entry: DictionaryEntry,
    /// Demais entradas com a mesma chave (outros organismos).
    pub alternatives: Vec<DictionaryEntry>,
    /// Veio do dicionário de inclusões globais.
    pub global_inclusion: bool,
}

impl CandidateAnnotation {
    /// Comprimento em caracteres (`hi - lo`).
    pub fn span_len(&self) -> usize {
        self.hi - self.lo
    }

    pub fn overlaps(&self, other: &CandidateAnnotation) -> bool {
        self.lo < other.hi && other.lo < self.hi
    }
}

/// Termos incluídos globalmente pelos usuários, indexados por chave normalizada.
#[derive(Debug, Clone, Default)]
pub struct InclusionOverlay {
    entries: HashMap<EntityType, HashMap<String, Vec<DictionaryEntry>>>,
}

impl InclusionOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entity_type: EntityType, entry: DictionaryEntry) {
        self.entries
            .entry(entity_type)
            .or_default()
            .entry(normalize_str(&entry.synonym))
            .or_default()
            .push(entry);
    }

    pub fn lookup(&self, entity_type: EntityType, key: &str) -> &[DictionaryEntry] {
        self.entries
            .get(&entity_type)
            .and_then(|m| m.get(key))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(HashMap::is_empty)
    }
}

/// Trecho previsto por um modelo externo de NLP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictedSpan {
    pub entity_type: EntityType,
    pub lo: usize,
    pub hi: usize,
}

/// Interface estreita para o serviço de NLP (chamada bloqueante).
pub trait EntityPredictor: Send + Sync {
    fn predict(&self, text: &str, types: &[EntityType]) -> crate::error::Result<Vec<PredictedSpan>>;
}

/// Mantém, para os tipos em `nlp_types`, apenas candidatos confirmados por
/// uma previsão sobreposta do mesmo tipo.
pub fn confirm_with_predictions(
    candidates: Vec<CandidateAnnotation>,
    nlp_types: &[EntityType],
    predictions: &[PredictedSpan],
) -> Vec<CandidateAnnotation> {
    candidates
        .into_iter()
        .filter(|c| {
            !nlp_types.contains(&c.entity_type)
                || predictions
                    .iter()
                    .any(|p| p.entity_type == c.entity_type && p.lo < c.hi && c.lo < p.hi)
        })
        .collect()
}

/// Janela que casou com o dicionário, antes de virar candidato.
struct WindowHit {
    lo: usize,
    hi: usize,
    text: String,
    page_number: u32,
    rects: Vec<Rect>,
    entries: Vec<DictionaryEntry>,
    global_inclusion: bool,
}

/// Motor de reconhecimento por dicionário.
pub struct RecognitionEngine<'a> {
    dictionary: &'a dyn EntityDictionary,
    config: &'a AnnotatorConfig,
    overlay: Option<&'a InclusionOverlay>,
    /// Offsets de caractere que separam segmentos, em ordem crescente.
    boundaries: &'a [usize],
}

impl<'a> RecognitionEngine<'a> {
    pub fn new(dictionary: &'a dyn EntityDictionary, config: &'a AnnotatorConfig) -> Self {
        Self {
            dictionary,
            config,
            overlay: None,
            boundaries: &[],
        }
    }

    pub fn with_overlay(mut self, overlay: &'a InclusionOverlay) -> Self {
        self.overlay = Some(overlay);
        self
    }

    /// Janelas que contêm algum desses offsets são ignoradas.
    pub fn with_boundaries(mut self, boundaries: &'a [usize]) -> Self {
        self.boundaries = boundaries;
        self
    }

    fn crosses_boundary(&self, lo: usize, hi: usize) -> bool {
        let idx = self.boundaries.partition_point(|b| *b < lo);
        self.boundaries.get(idx).is_some_and(|b| *b < hi)
    }

    /// Todos os candidatos dos tipos pedidos.
    ///
    /// Falha por inteiro se algum tipo não tiver dicionário disponível.
    pub fn recognize(
        &self,
        text: &str,
        tokens: &[Token],
        types: &[EntityType],
    ) -> std::result::Result<Vec<CandidateAnnotation>, AnnotationError> {
        for entity_type in types {
            self.dictionary.ensure_available(*entity_type)?;
        }
        let offsets = CharOffsets::new(text);
        let per_type: Vec<Vec<CandidateAnnotation>> = types
            .par_iter()
            .map(|t| self.scan_type(*t, text, &offsets, tokens))
            .collect::<std::result::Result<_, _>>()?;

        let mut candidates: Vec<CandidateAnnotation> = per_type.into_iter().flatten().collect();
        candidates.sort_by(|a, b| (a.lo, a.hi, a.entity_type).cmp(&(b.lo, b.hi, b.entity_type)));
        Ok(candidates)
    }

    fn lookup(
        &self,
        entity_type: EntityType,
        key: &str,
    ) -> std::result::Result<(Vec<DictionaryEntry>, bool), AnnotationError> {
        let entries = self.dictionary.lookup(entity_type, key)?;
        if !entries.is_empty() {
            return Ok((entries, false));
        }
        let overlay = self
            .overlay
            .map(|o| o.lookup(entity_type, key).to_vec())
            .unwrap_or_default();
        Ok((overlay, true))
    }

    fn scan_type(
        &self,
        entity_type: EntityType,
        text: &str,
        offsets: &CharOffsets,
        tokens: &[Token],
    ) -> std::result::Result<Vec<CandidateAnnotation>, AnnotationError> {
        let settings = self.config.settings(entity_type);
        let mut hits = Vec::new();

        for start in 0..tokens.len() {
            for n in (1..=settings.max_words).rev() {
                let Some(window) = tokens.get(start..start + n) else {
                    continue;
                };
                let (first, last) = (&window[0], &window[n - 1]);
                if first.page_number != last.page_number || self.crosses_boundary(first.lo, last.hi) {
                    continue;
                }
                let Some(surface) = offsets.slice(text, first.lo, last.hi) else {
                    continue;
                };
                let key = normalize_str(surface);
                if key.chars().count() < settings.min_key_length || self.config.is_stop_word(surface) {
                    continue;
                }

                let (entries, global_inclusion) = self.lookup(entity_type, &key)?;
                let exact = settings.case_sensitive && !global_inclusion;
                let entries: Vec<DictionaryEntry> = entries
                    .into_iter()
                    .filter(|e| !exact || e.synonym == surface)
                    .filter(|e| word_count(surface) <= word_count(&e.synonym))
                    .collect();
                if entries.is_empty() {
                    continue;
                }

                hits.push(WindowHit {
                    lo: first.lo,
                    hi: last.hi,
                    text: surface.to_string(),
                    page_number: first.page_number,
                    rects: window.iter().flat_map(|t| t.rects.iter().copied()).collect(),
                    entries,
                    global_inclusion,
                });
                break;
            }
        }

        if !entity_type.is_organism_dependent() {
            resolve_shared_synonyms(&mut hits);
        }
        debug!(entity_type = %entity_type, hits = hits.len(), "varredura concluída");

        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                let mut entries = hit.entries.into_iter();
                let entry = entries.next()?;
                Some(CandidateAnnotation {
                    entity_type,
                    text: hit.text,
                    lo: hit.lo,
                    hi: hit.hi,
                    page_number: hit.page_number,
                    rects: hit.rects,
                    entry,
                    alternatives: entries.collect(),
                    global_inclusion: hit.global_inclusion,
                })
            })
            .collect())
    }
}

/// Aplica a regra do sinônimo compartilhado a todas as janelas de um tipo.
fn resolve_shared_synonyms(hits: &mut Vec<WindowHit>) {
    let in_document: HashSet<String> = hits.iter().map(|h| normalize_str(&h.text)).collect();

    for hit in hits.iter_mut() {
        let mut names_by_synonym: HashMap<&str, HashSet<String>> = HashMap::new();
        for entry in &hit.entries {
            names_by_synonym
                .entry(entry.synonym.as_str())
                .or_default()
                .insert(normalize_str(&entry.name));
        }
        let keep: Vec<bool> = hit
            .entries
            .iter()
            .map(|entry| {
                let names = &names_by_synonym[entry.synonym.as_str()];
                if names.len() < 2 {
                    return true;
                }
                let present: Vec<&String> = names.iter().filter(|n| in_document.contains(*n)).collect();
                present.len() == 1 && *present[0] == normalize_str(&entry.name)
            })
            .collect();
        let mut flags = keep.into_iter();
        hit.entries.retain(|_| flags.next().unwrap_or(false));
    }
    hits.retain(|h| !h.entries.is_empty());
}

/// Atalho para testes e chamadores simples: reconhece sem overlay.
pub fn recognize(
    dictionary: &dyn EntityDictionary,
    config: &AnnotatorConfig,
    text: &str,
    tokens: &[Token],
    types: &[EntityType],
) -> Result<Vec<CandidateAnnotation>> {
    Ok(RecognitionEngine::new(dictionary, config).recognize(text, tokens, types)?)
}
