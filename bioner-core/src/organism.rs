//! # Desambiguação de Organismo
//!
//! Genes e proteínas são qualificados por organismo: o símbolo "TP53" tem
//! uma entrada para humano, outra para camundongo, etc. Este módulo escolhe
//! uma entrada por candidato usando as espécies mencionadas no documento.
//!
//! ## Algoritmo (por candidato com mais de um organismo)
//!
//! 1. Organismo mencionado **mais próximo** do gene (antes ou depois).
//!    Empate: maior frequência no documento, depois *Homo sapiens*.
//! 2. Se o mais próximo estiver além de `distance_threshold`:
//!    - organismo informado pelo chamador, se casar;
//!    - senão o mais próximo **antes** da menção;
//!    - senão o mais frequente do documento, se casar;
//!    - senão o `default_organism` da política, se casar.
//! 3. Nenhuma regra decide → política `unresolved` (`drop` ou `keep_first`).
//!
//! Vírus contam também como ocorrência humana: o hospedeiro de um vírus
//! citado num artigo é quase sempre humano.

use std::collections::HashMap;

use tracing::debug;

use crate::config::{OrganismPolicy, UnresolvedOrganism};
use crate::dictionary::{DictionaryEntry, EntityDictionary};
use crate::entity::{EntityType, HOMO_SAPIENS_TAX_ID, UNCATEGORIZED, VIRUSES};
use crate::recognition::CandidateAnnotation;
use crate::tokenizer::normalize_str;

/// Organismo informado pelo chamador como fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecifiedOrganism {
    pub synonym: String,
    pub tax_id: String,
    pub category: String,
}

impl SpecifiedOrganism {
    /// Busca a categoria no dicionário de espécies; `Uncategorized` se falhar.
    pub fn lookup(dictionary: &dyn EntityDictionary, synonym: &str, tax_id: &str) -> Self {
        let category = dictionary
            .lookup(EntityType::Species, &normalize_str(synonym))
            .ok()
            .and_then(|entries| entries.into_iter().find(|e| e.id == tax_id))
            .and_then(|e| e.category)
            .unwrap_or_else(|| UNCATEGORIZED.to_string());
        Self {
            synonym: synonym.to_string(),
            tax_id: tax_id.to_string(),
            category,
        }
    }
}

/// Espécies mencionadas no documento.
#[derive(Debug, Clone, Default)]
pub struct OrganismContext {
    frequency: HashMap<String, usize>,
    locations: HashMap<String, Vec<(usize, usize)>>,
    categories: HashMap<String, String>,
}

impl OrganismContext {
    pub fn from_species(species: &[CandidateAnnotation]) -> Self {
        let mut context = Self::default();
        for candidate in species.iter().filter(|c| c.entity_type == EntityType::Species) {
            let entry = &candidate.entry;
            context.record(&entry.id, candidate.lo, candidate.hi, entry.category.as_deref());
            if entry.category.as_deref() == Some(VIRUSES) {
                context.record(HOMO_SAPIENS_TAX_ID, candidate.lo, candidate.hi, None);
            }
        }
        context
    }

    fn record(&mut self, tax_id: &str, lo: usize, hi: usize, category: Option<&str>) {
        *self.frequency.entry(tax_id.to_string()).or_default() += 1;
        self.locations.entry(tax_id.to_string()).or_default().push((lo, hi));
        if let Some(category) = category {
            self.categories
                .entry(tax_id.to_string())
                .or_insert_with(|| category.to_string());
        }
    }

    pub fn frequency(&self, tax_id: &str) -> usize {
        self.frequency.get(tax_id).copied().unwrap_or(0)
    }

    /// Organismo mais citado; empate favorece humano, depois o menor id.
    pub fn most_frequent(&self) -> Option<&str> {
        self.frequency
            .iter()
            .max_by(|(a_id, a), (b_id, b)| {
                a.cmp(b)
                    .then_with(|| (*a_id == HOMO_SAPIENS_TAX_ID).cmp(&(*b_id == HOMO_SAPIENS_TAX_ID)))
                    .then_with(|| b_id.cmp(a_id))
            })
            .map(|(id, _)| id.as_str())
    }

    pub fn category(&self, tax_id: &str) -> Option<&str> {
        self.categories.get(tax_id).map(String::as_str)
    }

    /// Menor distância entre `[lo, hi)` e uma menção do organismo.
    /// Com `before_only`, só menções que terminam antes do trecho.
    fn distance(&self, tax_id: &str, lo: usize, hi: usize, before_only: bool) -> Option<usize> {
        self.locations
            .get(tax_id)?
            .iter()
            .filter(|(_, org_hi)| !before_only || *org_hi <= lo)
            .map(|&(org_lo, org_hi)| {
                if lo >= org_hi {
                    lo - org_hi
                } else {
                    org_lo.saturating_sub(hi)
                }
            })
            .min()
    }
}

/// Resolve entradas qualificadas por organismo.
pub struct OrganismResolver<'a> {
    policy: &'a OrganismPolicy,
    context: OrganismContext,
    specified: Option<SpecifiedOrganism>,
}

impl<'a> OrganismResolver<'a> {
    pub fn new(policy: &'a OrganismPolicy, context: OrganismContext) -> Self {
        Self {
            policy,
            context,
            specified: None,
        }
    }

    pub fn with_specified(mut self, specified: Option<SpecifiedOrganism>) -> Self {
        self.specified = specified;
        self
    }

    pub fn context(&self) -> &OrganismContext {
        &self.context
    }

    /// Filtra e reescreve os candidatos; tipos sem organismo passam intactos.
    pub fn resolve(&self, candidates: Vec<CandidateAnnotation>) -> Vec<CandidateAnnotation> {
        candidates
            .into_iter()
            .filter_map(|c| {
                if c.entity_type.is_organism_dependent() && !c.alternatives.is_empty() {
                    self.resolve_one(c)
                } else {
                    Some(c)
                }
            })
            .collect()
    }

    fn resolve_one(&self, mut candidate: CandidateAnnotation) -> Option<CandidateAnnotation> {
        // primeira entrada de cada organismo, na ordem do dicionário
        let mut by_organism: Vec<(String, DictionaryEntry)> = Vec::new();
        for entry in std::iter::once(&candidate.entry).chain(candidate.alternatives.iter()) {
            if let Some(org) = &entry.organism_id {
                if !by_organism.iter().any(|(id, _)| id == org) {
                    by_organism.push((org.clone(), entry.clone()));
                }
            }
        }
        if by_organism.is_empty() {
            return Some(candidate);
        }

        let chosen = self.select(&by_organism, candidate.lo, candidate.hi);
        match chosen {
            Some((tax_id, category)) => {
                debug!(text = %candidate.text, tax_id = %tax_id, "organismo escolhido");
                let mut entry = by_organism
                    .into_iter()
                    .find(|(id, _)| *id == tax_id)
                    .map(|(_, e)| e)?;
                entry.category = Some(category);
                candidate.entry = entry;
                candidate.alternatives.clear();
                Some(candidate)
            }
            None => match self.policy.unresolved {
                UnresolvedOrganism::Drop => {
                    debug!(text = %candidate.text, "nenhum organismo resolvido, candidato descartado");
                    None
                }
                UnresolvedOrganism::KeepFirst => {
                    candidate.alternatives.clear();
                    Some(candidate)
                }
            },
        }
    }

    /// Devolve `(tax_id, categoria)` do organismo escolhido.
    fn select(&self, matches: &[(String, DictionaryEntry)], lo: usize, hi: usize) -> Option<(String, String)> {
        let has = |tax_id: &str| matches.iter().any(|(id, _)| id == tax_id);
        let with_category = |tax_id: &str| {
            let category = self.context.category(tax_id).unwrap_or(UNCATEGORIZED);
            Some((tax_id.to_string(), category.to_string()))
        };

        let closest = self.closest(matches, lo, hi, false);
        if let Some((tax_id, distance)) = &closest {
            if *distance <= self.policy.distance_threshold {
                return with_category(tax_id);
            }
        }

        if let Some(specified) = &self.specified {
            if has(&specified.tax_id) {
                return Some((specified.tax_id.clone(), specified.category.clone()));
            }
        }
        if let Some((tax_id, _)) = self.closest(matches, lo, hi, true) {
            return with_category(&tax_id);
        }
        if let Some(tax_id) = self.context.most_frequent().filter(|id| has(id)) {
            return with_category(tax_id);
        }
        if let Some(tax_id) = self.policy.default_organism.as_deref().filter(|id| has(id)) {
            return with_category(tax_id);
        }
        None
    }

    fn closest(
        &self,
        matches: &[(String, DictionaryEntry)],
        lo: usize,
        hi: usize,
        before_only: bool,
    ) -> Option<(String, usize)> {
        let mut best: Option<(&str, usize)> = None;
        for (tax_id, _) in matches {
            let Some(distance) = self.context.distance(tax_id, lo, hi, before_only) else {
                continue;
            };
            let better = match best {
                None => true,
                Some((best_id, best_distance)) => {
                    distance < best_distance
                        || (distance == best_distance && self.prefer(tax_id, best_id))
                }
            };
            if better {
                best = Some((tax_id, distance));
            }
        }
        best.map(|(id, d)| (id.to_string(), d))
    }

    /// Desempate entre organismos equidistantes.
    fn prefer(&self, candidate: &str, current: &str) -> bool {
        let (fc, fb) = (self.context.frequency(candidate), self.context.frequency(current));
        if fc != fb {
            return fc > fb;
        }
        candidate == HOMO_SAPIENS_TAX_ID && current != HOMO_SAPIENS_TAX_ID
    }
}
