//! # Anotação Final
//!
//! Formato externo de uma anotação. Visualizadores e o diff de histórico
//! leem estes campos **pelo nome**, então nomes e caixa das chaves são um
//! contrato:
//!
//! ```json
//! {
//!   "keyword": "TP53",
//!   "loLocationOffset": 10, "hiLocationOffset": 13, "keywordLength": 4,
//!   "pageNumber": 1, "rects": [[1.0, 2.0, 3.0, 4.0]],
//!   "uuid": "…",
//!   "meta": { "type": "Gene", "id": "7157", "idType": "NCBI Gene", … },
//!   "primaryName": "TP53"
//! }
//! ```
//!
//! Offsets são de caractere. `hiLocationOffset` é o índice do **último**
//! caractere (inclusivo), então `keywordLength == hi - lo + 1`. Dentro do
//! crate o fim é exclusivo: [`Annotation::hi`] devolve `hiLocationOffset + 1`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::{id_hyperlink, search_links, EntityType, Links};
use crate::recognition::CandidateAnnotation;
use crate::tokenizer::Rect;

/// Metadados de uma anotação.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub id_type: String,
    #[serde(default)]
    pub id_hyperlinks: Vec<String>,
    /// Inserida pelo usuário, não pelo reconhecimento.
    #[serde(default)]
    pub is_custom: bool,
    #[serde(default)]
    pub all_text: String,
    #[serde(default)]
    pub links: Links,
    #[serde(default)]
    pub include_globally: bool,
    #[serde(default)]
    pub is_case_insensitive: bool,
    #[serde(default)]
    pub is_excluded: bool,
    #[serde(default)]
    pub exclusion_reason: String,
    #[serde(default)]
    pub exclusion_comment: String,
    /// Categoria do organismo (genes, proteínas e espécies).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Domínio de origem de uma célula de tabela de enriquecimento.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentDomain {
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_domain: Option<String>,
}

/// Anotação resolvida.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    /// Texto anotado, como aparece no documento.
    pub keyword: String,
    pub lo_location_offset: usize,
    /// Inclusivo.
    pub hi_location_offset: usize,
    pub keyword_length: usize,
    pub page_number: u32,
    pub rects: Vec<Rect>,
    pub uuid: String,
    pub meta: Meta,
    pub primary_name: String,
    /// Gene da linha de origem (apenas tabelas de enriquecimento).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment_gene: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment_domain: Option<EnrichmentDomain>,
}

impl Annotation {
    /// Converte um candidato vencedor; `primary_name` é preenchido depois.
    pub fn from_candidate(candidate: CandidateAnnotation) -> Self {
        let entry = candidate.entry;
        let id_hyperlinks = if entry.hyperlinks.is_empty() {
            id_hyperlink(&entry.id_type, &entry.id).into_iter().collect()
        } else {
            entry.hyperlinks
        };
        Self {
            keyword_length: candidate.hi - candidate.lo,
            lo_location_offset: candidate.lo,
            hi_location_offset: last_index(candidate.lo, candidate.hi),
            page_number: candidate.page_number,
            rects: candidate.rects,
            uuid: Uuid::new_v4().to_string(),
            meta: Meta {
                entity_type: candidate.entity_type,
                id: entry.id,
                id_type: entry.id_type,
                id_hyperlinks,
                is_custom: false,
                all_text: entry.synonym,
                links: search_links(&candidate.text),
                include_globally: candidate.global_inclusion,
                is_case_insensitive: false,
                is_excluded: false,
                exclusion_reason: String::new(),
                exclusion_comment: String::new(),
                category: entry.category,
            },
            keyword: candidate.text,
            primary_name: String::new(),
            enrichment_gene: None,
            enrichment_domain: None,
        }
    }

    pub fn lo(&self) -> usize {
        self.lo_location_offset
    }

    /// Fim exclusivo.
    pub fn hi(&self) -> usize {
        self.hi_location_offset + 1
    }

    /// Sobreposição com o intervalo exclusivo `[lo, hi)`.
    pub fn overlaps(&self, lo: usize, hi: usize) -> bool {
        self.lo() < hi && lo < self.hi()
    }
}

/// Índice do último caractere de `[lo, hi)`.
pub(crate) fn last_index(lo: usize, hi: usize) -> usize {
    hi.saturating_sub(1).max(lo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::entry;

    fn tp53() -> CandidateAnnotation {
        CandidateAnnotation {
            entity_type: EntityType::Gene,
            text: "TP53".into(),
            lo: 10,
            hi: 14,
            page_number: 3,
            rects: vec![[1.0, 2.0, 3.0, 4.0]],
            entry: entry("7157", "NCBI Gene", "TP53", "TP53"),
            alternatives: vec![],
            global_inclusion: false,
        }
    }

    #[test]
    fn test_from_candidate() {
        let annotation = Annotation::from_candidate(tp53());
        assert_eq!(annotation.keyword_length, 4);
        assert_eq!(annotation.lo_location_offset, 10);
        assert_eq!(annotation.hi_location_offset, 13, "hiLocationOffset aponta o último caractere");
        assert_eq!(annotation.hi(), 14);
        assert_eq!(annotation.meta.id_hyperlinks, vec!["https://www.ncbi.nlm.nih.gov/gene/7157"]);
        assert!(!annotation.meta.is_custom);
        assert!(annotation.meta.links.google.ends_with("TP53"));
        assert_eq!(annotation.uuid.len(), 36);
        assert!(annotation.overlaps(13, 20));
        assert!(!annotation.overlaps(14, 20));
    }

    #[test]
    fn test_wire_field_names() {
        let annotation = Annotation::from_candidate(tp53());
        let json = serde_json::to_value(&annotation).unwrap();
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        for key in [
            "keyword", "loLocationOffset", "hiLocationOffset", "keywordLength",
            "pageNumber", "rects", "uuid", "meta", "primaryName",
        ] {
            assert!(keys.contains(&key), "Campo {key} ausente");
        }
        assert!(!keys.contains(&"enrichmentGene"), "Campo de enriquecimento só aparece quando presente");

        let meta = &json["meta"];
        assert_eq!(meta["type"], "Gene");
        assert_eq!(meta["idType"], "NCBI Gene");
        for key in [
            "id", "idHyperlinks", "isCustom", "allText", "links", "includeGlobally",
            "isCaseInsensitive", "isExcluded", "exclusionReason", "exclusionComment",
        ] {
            assert!(meta.get(key).is_some(), "Campo meta.{key} ausente");
        }
        assert_eq!(json["rects"], serde_json::json!([[1.0, 2.0, 3.0, 4.0]]));
        assert_eq!(json["loLocationOffset"], 10);
        assert_eq!(json["hiLocationOffset"], 13);
        assert_eq!(json["keywordLength"], 4);
    }

    #[test]
    fn test_enrichment_domain_wire() {
        let domain = EnrichmentDomain { domain: "Regulon".into(), sub_domain: Some("Regulator".into()) };
        let json = serde_json::to_value(&domain).unwrap();
        assert_eq!(json, serde_json::json!({"domain": "Regulon", "subDomain": "Regulator"}));
    }
}
