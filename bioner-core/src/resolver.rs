//! # Resolução de Anotações
//!
//! Aplicado sobre o conjunto já fundido, nesta ordem:
//!
//! 1. **Inclusões locais** (anotações do usuário) entram como vieram. Toda
//!    anotação automática que cruza uma inclusão é descartada.
//! 2. **Exclusões** globais e locais removem anotações automáticas por
//!    `id + tipo`, ou por `texto + tipo`. Exclusões que não casam com nada
//!    só geram log.
//! 3. **Nome primário**: dicionário pelo id → texto anotado → `allText` de
//!    anotações do usuário → string vazia. Nunca falha.
//!
//! ## Registros malformados
//!
//! Inclusões e exclusões chegam como JSON cru e são interpretadas uma a
//! uma: um registro sem campo obrigatório é descartado com `warn!`, e o
//! resto da requisição segue.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::annotation::{last_index, Annotation, Meta};
use crate::config::AnnotatorConfig;
use crate::dictionary::{DictionaryEntry, EntityDictionary};
use crate::entity::{id_hyperlink, search_links, EntityType};
use crate::merge::IntervalTree;
use crate::recognition::InclusionOverlay;
use crate::tokenizer::{normalize_str, CharOffsets, Rect};

/// Exclusão pedida pelo usuário.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExclusionRecord {
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, alias = "keyword")]
    pub text: Option<String>,
    #[serde(default)]
    pub is_case_insensitive: bool,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub comment: String,
}

impl ExclusionRecord {
    fn validate(self) -> Result<Self, String> {
        let has_id = self.id.as_deref().is_some_and(|s| !s.is_empty());
        let has_text = self.text.as_deref().is_some_and(|s| !s.trim().is_empty());
        if has_id || has_text {
            Ok(self)
        } else {
            Err("exclusão sem id e sem texto".to_string())
        }
    }

    fn matches(&self, annotation: &Annotation, case_sensitive: bool) -> bool {
        if annotation.meta.is_custom || annotation.meta.entity_type != self.entity_type {
            return false;
        }
        if let Some(id) = self.id.as_deref().filter(|id| !id.is_empty()) {
            return annotation.meta.id == id;
        }
        match self.text.as_deref() {
            Some(text) if case_sensitive && !self.is_case_insensitive => annotation.keyword == text,
            Some(text) => normalize_str(&annotation.keyword) == normalize_str(text),
            None => false,
        }
    }
}

/// Anotação fornecida pelo usuário.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InclusionRecord {
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(default)]
    pub id: String,
    #[serde(default = "custom_id_type")]
    pub id_type: String,
    #[serde(alias = "allText", alias = "keyword")]
    pub text: String,
    #[serde(default, alias = "loLocationOffset")]
    pub lo: Option<usize>,
    /// Último caractere, inclusivo como `hiLocationOffset`.
    #[serde(default, alias = "hiLocationOffset")]
    pub hi: Option<usize>,
    #[serde(default = "first_page")]
    pub page_number: u32,
    #[serde(default)]
    pub rects: Vec<Rect>,
    #[serde(default)]
    pub id_hyperlinks: Vec<String>,
    #[serde(default)]
    pub include_globally: bool,
    #[serde(default)]
    pub is_case_insensitive: bool,
}

fn custom_id_type() -> String {
    "CUSTOM".to_string()
}

fn first_page() -> u32 {
    1
}

impl InclusionRecord {
    fn validate(self) -> Result<Self, String> {
        if self.text.trim().is_empty() {
            Err("inclusão sem texto".to_string())
        } else {
            Ok(self)
        }
    }

    /// Entrada equivalente no dicionário de inclusões globais.
    pub fn as_dictionary_entry(&self) -> DictionaryEntry {
        DictionaryEntry {
            id: self.id.clone(),
            id_type: self.id_type.clone(),
            name: self.text.clone(),
            synonym: self.text.clone(),
            category: None,
            organism_id: None,
            hyperlinks: self.id_hyperlinks.clone(),
        }
    }

    /// `[lo, hi)` exclusivo.
    fn to_annotation(&self, lo: usize, hi: usize) -> Annotation {
        let id_hyperlinks = if self.id_hyperlinks.is_empty() {
            let target = if self.id.is_empty() { &self.text } else { &self.id };
            id_hyperlink(&self.id_type, target).into_iter().collect()
        } else {
            self.id_hyperlinks.clone()
        };
        Annotation {
            keyword: self.text.clone(),
            lo_location_offset: lo,
            hi_location_offset: last_index(lo, hi),
            keyword_length: hi - lo,
            page_number: self.page_number,
            rects: self.rects.clone(),
            uuid: Uuid::new_v4().to_string(),
            meta: Meta {
                entity_type: self.entity_type,
                id: self.id.clone(),
                id_type: self.id_type.clone(),
                id_hyperlinks,
                is_custom: true,
                all_text: self.text.clone(),
                links: search_links(&self.text),
                include_globally: self.include_globally,
                is_case_insensitive: self.is_case_insensitive,
                is_excluded: false,
                exclusion_reason: String::new(),
                exclusion_comment: String::new(),
                category: None,
            },
            primary_name: String::new(),
            enrichment_gene: None,
            enrichment_domain: None,
        }
    }
}

/// Interpreta registros crus um a um, descartando os inválidos.
fn parse_records<T, F>(raw: &[Value], kind: &str, validate: F) -> Vec<T>
where
    T: DeserializeOwned,
    F: Fn(T) -> Result<T, String>,
{
    raw.iter()
        .enumerate()
        .filter_map(|(i, value)| {
            let parsed = serde_json::from_value::<T>(value.clone())
                .map_err(|e| e.to_string())
                .and_then(&validate);
            match parsed {
                Ok(record) => Some(record),
                Err(reason) => {
                    warn!(kind, index = i, %reason, "registro malformado ignorado");
                    None
                }
            }
        })
        .collect()
}

pub fn parse_exclusions(raw: &[Value]) -> Vec<ExclusionRecord> {
    parse_records(raw, "exclusion", ExclusionRecord::validate)
}

pub fn parse_inclusions(raw: &[Value]) -> Vec<InclusionRecord> {
    parse_records(raw, "inclusion", InclusionRecord::validate)
}

/// Dicionário extra com as inclusões marcadas como globais.
pub fn global_overlay<'a>(inclusions: impl IntoIterator<Item = &'a InclusionRecord>) -> InclusionOverlay {
    let mut overlay = InclusionOverlay::new();
    for inclusion in inclusions.into_iter().filter(|i| i.include_globally) {
        overlay.insert(inclusion.entity_type, inclusion.as_dictionary_entry());
    }
    overlay
}

/// Contadores da resolução, para log e eventos.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionStats {
    pub inclusions_applied: usize,
    pub inclusions_skipped: usize,
    pub replaced_by_inclusions: usize,
    pub excluded: usize,
    pub unmatched_exclusions: usize,
}

/// Aplica inclusões, exclusões e nomes primários.
pub struct AnnotationResolver<'a> {
    dictionary: &'a dyn EntityDictionary,
    config: &'a AnnotatorConfig,
}

impl<'a> AnnotationResolver<'a> {
    pub fn new(dictionary: &'a dyn EntityDictionary, config: &'a AnnotatorConfig) -> Self {
        Self { dictionary, config }
    }

    /// `merged` precisa estar sem sobreposição; o resultado também estará.
    pub fn resolve(
        &self,
        text: &str,
        merged: Vec<Annotation>,
        inclusions: &[InclusionRecord],
        exclusions: &[ExclusionRecord],
    ) -> (Vec<Annotation>, ResolutionStats) {
        let mut stats = ResolutionStats::default();

        // === Passo 1: Inclusões locais ===
        let custom = self.accept_inclusions(text, inclusions, &mut stats);
        let tree = IntervalTree::new(custom.iter().map(|a| (a.lo(), a.hi(), ())));
        let before = merged.len();
        let automatic: Vec<Annotation> = merged
            .into_iter()
            .filter(|a| tree.overlapping(a.lo(), a.hi()).is_empty())
            .collect();
        stats.replaced_by_inclusions = before - automatic.len();

        // === Passo 2: Exclusões ===
        let mut hits = vec![0usize; exclusions.len()];
        let automatic: Vec<Annotation> = automatic
            .into_iter()
            .filter(|a| {
                let case_sensitive = self.config.settings(a.meta.entity_type).case_sensitive;
                let mut excluded = false;
                for (i, exclusion) in exclusions.iter().enumerate() {
                    if exclusion.matches(a, case_sensitive) {
                        hits[i] += 1;
                        excluded = true;
                    }
                }
                !excluded
            })
            .collect();
        for (exclusion, count) in exclusions.iter().zip(&hits) {
            if *count == 0 {
                stats.unmatched_exclusions += 1;
                info!(
                    entity_type = %exclusion.entity_type,
                    id = exclusion.id.as_deref().unwrap_or(""),
                    text = exclusion.text.as_deref().unwrap_or(""),
                    "exclusão sem correspondência"
                );
            } else {
                stats.excluded += count;
            }
        }

        // === Passo 3: Nome primário ===
        let mut annotations: Vec<Annotation> = custom.into_iter().chain(automatic).collect();
        for annotation in &mut annotations {
            annotation.primary_name = self.primary_name(annotation);
        }
        annotations.sort_by_key(|a| (a.lo(), a.hi()));
        (annotations, stats)
    }

    fn accept_inclusions(
        &self,
        text: &str,
        inclusions: &[InclusionRecord],
        stats: &mut ResolutionStats,
    ) -> Vec<Annotation> {
        let char_len = CharOffsets::new(text).char_len();
        let mut accepted: Vec<Annotation> = Vec::new();
        for inclusion in inclusions {
            let (Some(lo), Some(last)) = (inclusion.lo, inclusion.hi) else {
                // só global: não tem posição neste documento
                continue;
            };
            let hi = last + 1;
            if lo >= hi || hi > char_len {
                warn!(lo, hi, text = %inclusion.text, "inclusão fora do documento ignorada");
                stats.inclusions_skipped += 1;
                continue;
            }
            if accepted.iter().any(|a| a.overlaps(lo, hi)) {
                warn!(lo, hi, text = %inclusion.text, "inclusão sobreposta a outra ignorada");
                stats.inclusions_skipped += 1;
                continue;
            }
            accepted.push(inclusion.to_annotation(lo, hi));
        }
        stats.inclusions_applied = accepted.len();
        accepted
    }

    /// Dicionário → texto anotado → `allText` (usuário) → "".
    pub fn primary_name(&self, annotation: &Annotation) -> String {
        let meta = &annotation.meta;
        Some(meta.id.as_str())
            .filter(|id| !id.is_empty())
            .and_then(|id| self.dictionary.primary_name(meta.entity_type, id))
            .or_else(|| Some(annotation.keyword.clone()).filter(|k| !k.is_empty()))
            .or_else(|| {
                Some(meta.all_text.clone()).filter(|t| meta.is_custom && !t.is_empty())
            })
            .unwrap_or_default()
    }
}
