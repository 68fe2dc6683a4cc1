//! # Tabelas de Enriquecimento
//!
//! Uma tabela de enriquecimento tem uma linha por gene importado e várias
//! células de texto (nome importado, gene casado, nome completo, domínios
//! Regulon/UniProt/String). Anotar célula por célula seria lento e perderia
//! consistência entre células, então:
//!
//! 1. [`cells_from_table`] lista as células anotáveis, em ordem;
//! 2. [`EnrichmentOffsetMapper::combine`] concatena os textos com um espaço
//!    entre células e guarda onde cada célula termina ([`EnrichmentCellMap`]);
//! 3. o pipeline roda uma vez sobre o texto combinado;
//! 4. [`EnrichmentOffsetMapper::remap`] devolve cada anotação à sua célula,
//!    com offsets relativos à célula;
//! 5. [`highlight`] gera o snippet marcado, gravado de volta na tabela.
//!
//! ## Offsets
//!
//! Internamente tudo é `[lo, hi)` em caracteres. A célula `i` ocupa
//! `[start_i, end_i)` no texto combinado, com `start_{i+1} = end_i + 1`, e
//! o separador em `end_i` é fronteira para o reconhecimento: nenhum termo
//! atravessa células. Uma anotação pertence à primeira célula com
//! `hi <= end_i`; na célula, `lo' = lo - start_i` e
//! `hi' = lo' + keyword_length - 1` (inclusivo, como todo
//! `hiLocationOffset`), logo `cell_text[lo'..=hi']` é o termo casado.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::annotation::{last_index, Annotation, EnrichmentDomain};
use crate::tokenizer::CharOffsets;

pub const DOMAIN_REGULON: &str = "Regulon";
pub const DOMAIN_UNIPROT: &str = "UniProt";
pub const DOMAIN_STRING: &str = "String";

/// Separador entre células no texto combinado.
const CELL_BOUNDARY: char = ' ';

/// Célula de domínio (`domains[domínio][rótulo]`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainCell {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotated_text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Uma linha da tabela. Campos desconhecidos são preservados.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneRow {
    #[serde(default)]
    pub imported: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domains: Option<BTreeMap<String, BTreeMap<String, DomainCell>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotated_imported: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotated_matched: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotated_full_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    #[serde(default)]
    pub genes: Vec<GeneRow>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentTable {
    pub result: EnrichmentResult,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Coluna de origem de uma célula.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellKind {
    Imported,
    Matched,
    FullName,
    Domain { domain: String, label: String },
}

impl CellKind {
    fn enrichment_domain(&self) -> EnrichmentDomain {
        let (domain, sub_domain) = match self {
            CellKind::Imported => ("Imported", None),
            CellKind::Matched => ("Matched", None),
            CellKind::FullName => ("Full Name", None),
            CellKind::Domain { domain, label } if domain == DOMAIN_REGULON => {
                (domain.as_str(), Some(label.clone()))
            }
            CellKind::Domain { domain, .. } => (domain.as_str(), None),
        };
        EnrichmentDomain {
            domain: domain.to_string(),
            sub_domain,
        }
    }
}

/// Uma célula anotável.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellDescriptor {
    /// Índice da linha em `result.genes`.
    pub row: usize,
    pub kind: CellKind,
    pub text: String,
    /// Texto importado da linha, copiado para `enrichmentGene`.
    pub gene: String,
}

/// `(fim exclusivo no texto combinado, célula)`, em ordem.
pub type EnrichmentCellMap = Vec<(usize, CellDescriptor)>;

/// Células anotáveis da tabela, na ordem de concatenação.
///
/// Linhas sem `matched` não foram casadas e ficam de fora. Células GO e
/// BioCyc nunca são anotadas.
pub fn cells_from_table(table: &EnrichmentTable) -> Vec<CellDescriptor> {
    let mut cells = Vec::new();
    for (row, gene) in table.result.genes.iter().enumerate() {
        let Some(matched) = gene.matched.as_ref() else {
            debug!(row, "linha sem gene casado ignorada");
            continue;
        };
        let cell = |kind: CellKind, text: &str| CellDescriptor {
            row,
            kind,
            text: text.to_string(),
            gene: gene.imported.clone(),
        };
        cells.push(cell(CellKind::Imported, &gene.imported));
        cells.push(cell(CellKind::Matched, matched));
        cells.push(cell(CellKind::FullName, gene.full_name.as_deref().unwrap_or("")));

        let Some(domains) = gene.domains.as_ref() else {
            continue;
        };
        if let Some(regulon) = domains.get(DOMAIN_REGULON) {
            for (label, value) in regulon {
                if let Some(text) = value.text.as_deref() {
                    let kind = CellKind::Domain { domain: DOMAIN_REGULON.into(), label: label.clone() };
                    cells.push(cell(kind, text));
                }
            }
        }
        for (domain, label) in [(DOMAIN_UNIPROT, "Function"), (DOMAIN_STRING, "Annotation")] {
            let text = domains
                .get(domain)
                .and_then(|d| d.get(label))
                .and_then(|c| c.text.as_deref());
            if let Some(text) = text {
                let kind = CellKind::Domain { domain: domain.into(), label: label.into() };
                cells.push(cell(kind, text));
            }
        }
    }
    cells
}

/// Anotações de uma célula, já com offsets relativos a ela.
#[derive(Debug, Clone, PartialEq)]
pub struct CellAnnotations {
    pub cell: CellDescriptor,
    pub annotations: Vec<Annotation>,
}

/// Concatena células e devolve anotações a elas.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentOffsetMapper {
    text: String,
    cell_map: EnrichmentCellMap,
}

impl EnrichmentOffsetMapper {
    pub fn combine(cells: Vec<CellDescriptor>) -> Self {
        let mut text = String::new();
        let mut cell_map = Vec::with_capacity(cells.len());
        let mut len = 0;
        for cell in cells {
            text.push_str(&cell.text);
            len += cell.text.chars().count();
            cell_map.push((len, cell));
            text.push(CELL_BOUNDARY);
            len += 1;
        }
        Self { text, cell_map }
    }

    pub fn from_table(table: &EnrichmentTable) -> Self {
        Self::combine(cells_from_table(table))
    }

    /// Texto combinado que o pipeline deve anotar.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cell_map(&self) -> &EnrichmentCellMap {
        &self.cell_map
    }

    /// Posições dos separadores, que o reconhecimento não pode atravessar.
    pub fn boundaries(&self) -> Vec<usize> {
        self.cell_map.iter().map(|(end, _)| *end).collect()
    }

    /// Reparte anotações do texto combinado entre as células.
    ///
    /// `annotations` precisa estar sem sobreposição. O resultado tem uma
    /// entrada por célula, mesmo sem anotações.
    pub fn remap(&self, mut annotations: Vec<Annotation>) -> Vec<CellAnnotations> {
        annotations.sort_by_key(|a| a.lo());
        let mut pending = annotations.into_iter().peekable();
        let mut start = 0;
        let mut out = Vec::with_capacity(self.cell_map.len());

        for (end, cell) in &self.cell_map {
            let mut chunk = Vec::new();
            while let Some(mut annotation) = pending.next_if(|a| a.hi() <= *end) {
                if annotation.lo() < start {
                    warn!(
                        keyword = %annotation.keyword,
                        lo = annotation.lo(),
                        hi = annotation.hi(),
                        "anotação atravessa células, descartada"
                    );
                    continue;
                }
                let lo = annotation.lo() - start;
                annotation.lo_location_offset = lo;
                annotation.hi_location_offset = last_index(lo, lo + annotation.keyword_length);
                annotation.enrichment_gene = Some(cell.gene.clone());
                annotation.enrichment_domain = Some(cell.kind.enrichment_domain());
                chunk.push(annotation);
            }
            out.push(CellAnnotations {
                cell: cell.clone(),
                annotations: chunk,
            });
            start = end + 1;
        }

        let leftover = pending.count();
        if leftover > 0 {
            warn!(leftover, "anotações fora de qualquer célula descartadas");
        }
        out
    }

    /// Remapeia, gera os snippets e grava na tabela.
    ///
    /// Devolve todas as anotações remapeadas, em ordem de célula.
    pub fn apply(&self, annotations: Vec<Annotation>, table: &mut EnrichmentTable) -> Vec<Annotation> {
        let mut all = Vec::new();
        for CellAnnotations { cell, annotations } in self.remap(annotations) {
            let snippet = highlight(&cell.text, &annotations);
            write_snippet(table, &cell, snippet);
            all.extend(annotations);
        }
        all
    }
}

fn write_snippet(table: &mut EnrichmentTable, cell: &CellDescriptor, snippet: String) {
    let Some(row) = table.result.genes.get_mut(cell.row) else {
        warn!(row = cell.row, "linha da célula não existe mais");
        return;
    };
    match &cell.kind {
        CellKind::Imported => row.annotated_imported = Some(snippet),
        CellKind::Matched => row.annotated_matched = Some(snippet),
        CellKind::FullName => row.annotated_full_name = Some(snippet),
        CellKind::Domain { domain, label } => {
            let target = row
                .domains
                .as_mut()
                .and_then(|d| d.get_mut(domain))
                .and_then(|d| d.get_mut(label));
            match target {
                Some(target) => target.annotated_text = Some(snippet),
                None => warn!(row = cell.row, %domain, %label, "célula de domínio não existe mais"),
            }
        }
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Envolve cada trecho anotado em `<annotation>` e o todo em `<snippet>`.
///
/// Texto fora das anotações é copiado sem alteração. `annotations` precisa
/// estar em offsets da célula, ordenado e sem sobreposição.
pub fn highlight(cell_text: &str, annotations: &[Annotation]) -> String {
    let offsets = CharOffsets::new(cell_text);
    let mut out = String::from("<snippet>");
    let mut prev = 0;
    for annotation in annotations {
        let (lo, hi) = (annotation.lo(), annotation.hi());
        let (Some(before), Some(term)) = (
            offsets.slice(cell_text, prev, lo),
            offsets.slice(cell_text, lo, hi),
        ) else {
            warn!(lo, hi, "anotação fora da célula ignorada no snippet");
            continue;
        };
        let meta = serde_json::to_string(&annotation.meta).unwrap_or_default();
        out.push_str(before);
        out.push_str(&format!(
            r#"<annotation type="{}" meta="{}">{}</annotation>"#,
            annotation.meta.entity_type,
            html_escape(&meta),
            term
        ));
        prev = hi;
    }
    if let Some(rest) = offsets.slice(cell_text, prev, offsets.char_len()) {
        out.push_str(rest);
    }
    out.push_str("</snippet>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::entry;
    use crate::entity::EntityType;
    use crate::recognition::CandidateAnnotation;
    use proptest::prelude::*;
    use serde_json::json;

    fn annotation(entity_type: EntityType, text: &str, lo: usize) -> Annotation {
        Annotation::from_candidate(CandidateAnnotation {
            entity_type,
            text: text.to_string(),
            lo,
            hi: lo + text.chars().count(),
            page_number: 1,
            rects: vec![],
            entry: entry("1", "MESH", text, text),
            alternatives: vec![],
            global_inclusion: false,
        })
    }

    fn cell(row: usize, kind: CellKind, text: &str) -> CellDescriptor {
        CellDescriptor { row, kind, text: text.into(), gene: "atpA".into() }
    }

    fn table() -> EnrichmentTable {
        serde_json::from_value(json!({
            "data": {"organism": "E. coli"},
            "result": {
                "version": "5",
                "genes": [
                    {"imported": "xyz"},
                    {
                        "imported": "atpA",
                        "matched": "atpA",
                        "fullName": "ATP synthase",
                        "link": "https://example.org/atpA",
                        "domains": {
                            "Regulon": {
                                "Regulator Family": {"text": "kinase family"},
                                "Activated By": {"text": "ATP"}
                            },
                            "UniProt": {"Function": {"text": "kinase activity", "link": "u"}},
                            "GO": {"Annotation": {"text": "ATP binding"}},
                            "String": {"Annotation": {"text": "ATP"}}
                        }
                    }
                ]
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_two_cell_round_trip() {
        let mapper = EnrichmentOffsetMapper::combine(vec![
            cell(0, CellKind::Imported, "ATP"),
            cell(0, CellKind::Matched, "kinase activity"),
        ]);
        assert_eq!(mapper.text(), "ATP kinase activity ");
        let ends: Vec<usize> = mapper.cell_map().iter().map(|(end, _)| *end).collect();
        assert_eq!(ends, vec![3, 19]);

        let annotations = vec![
            annotation(EntityType::Chemical, "ATP", 0),
            annotation(EntityType::Phenomena, "kinase", 4),
            annotation(EntityType::Phenomena, "activity", 11),
        ];
        let cells = mapper.remap(annotations);
        assert_eq!(cells[0].annotations.len(), 1);
        assert_eq!((cells[0].annotations[0].lo(), cells[0].annotations[0].hi()), (0, 3));

        let second = &cells[1];
        assert_eq!(second.annotations.len(), 2);
        for a in &second.annotations {
            let (lo, hi) = (a.lo_location_offset, a.hi_location_offset);
            assert_eq!(&second.cell.text[lo..=hi], a.keyword, "Offset remapeado errado");
        }
        let wire: Vec<(usize, usize)> = second
            .annotations
            .iter()
            .map(|a| (a.lo_location_offset, a.hi_location_offset))
            .collect();
        assert_eq!(wire, vec![(0, 5), (7, 14)], "hiLocationOffset é o último caractere da célula");
        assert_eq!(second.annotations[0].enrichment_gene.as_deref(), Some("atpA"));
    }

    #[test]
    fn test_boundaries_are_separators() {
        let mapper = EnrichmentOffsetMapper::combine(vec![
            cell(0, CellKind::Imported, "ATP"),
            cell(0, CellKind::Matched, "kinase activity"),
        ]);
        assert_eq!(mapper.boundaries(), vec![3, 19]);
        for b in mapper.boundaries() {
            assert_eq!(mapper.text().chars().nth(b), Some(CELL_BOUNDARY));
        }
    }

    #[test]
    fn test_straddling_annotation_is_dropped() {
        let mapper = EnrichmentOffsetMapper::combine(vec![
            cell(0, CellKind::Imported, "ATP"),
            cell(0, CellKind::Matched, "kinase"),
        ]);
        let cells = mapper.remap(vec![annotation(EntityType::Chemical, "ATP kinase", 0)]);
        assert!(cells.iter().all(|c| c.annotations.is_empty()));
    }

    #[test]
    fn test_cells_from_table_order() {
        let cells = cells_from_table(&table());
        assert_eq!(cells.len(), 7, "Linha sem 'matched' e células GO ficam de fora");
        assert!(cells.iter().all(|c| c.row == 1 && c.gene == "atpA"));
        assert_eq!(cells[0].kind, CellKind::Imported);
        assert_eq!(cells[1].kind, CellKind::Matched);
        assert_eq!(cells[2].kind, CellKind::FullName);
        assert_eq!(cells[2].text, "ATP synthase");
        // Rótulos do Regulon em ordem, depois UniProt, depois String
        let texts: Vec<&str> = cells[3..].iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["ATP", "kinase family", "kinase activity", "ATP"]);
    }

    #[test]
    fn test_enrichment_domain_of_cells() {
        let regulon = CellKind::Domain { domain: "Regulon".into(), label: "Activated By".into() };
        assert_eq!(regulon.enrichment_domain().sub_domain.as_deref(), Some("Activated By"));
        let uniprot = CellKind::Domain { domain: "UniProt".into(), label: "Function".into() };
        assert_eq!(uniprot.enrichment_domain().sub_domain, None);
        assert_eq!(CellKind::FullName.enrichment_domain().domain, "Full Name");
    }

    #[test]
    fn test_highlight_markup() {
        let a = annotation(EntityType::Chemical, "ATP", 4);
        let snippet = highlight("use ATP now", &[a]);
        assert!(snippet.starts_with("<snippet>use <annotation type=\"Chemical\" meta=\"{&quot;type&quot;:&quot;Chemical&quot;"));
        assert!(snippet.ends_with(">ATP</annotation> now</snippet>"));
        assert_eq!(highlight("nada", &[]), "<snippet>nada</snippet>");
    }

    #[test]
    fn test_apply_writes_back_and_keeps_unknown_fields() {
        let mut table = table();
        let mapper = EnrichmentOffsetMapper::from_table(&table);
        // "atpA atpA ATP synthase ATP ..." -> "ATP" de "ATP synthase" começa em 10
        assert!(mapper.text().starts_with("atpA atpA ATP synthase ATP "));
        let remapped = mapper.apply(vec![annotation(EntityType::Chemical, "ATP", 10)], &mut table);
        assert_eq!(remapped.len(), 1);
        assert_eq!(remapped[0].lo(), 0);

        let row = &table.result.genes[1];
        assert!(row.annotated_full_name.as_deref().unwrap_or("").contains("</annotation> synthase"));
        assert_eq!(row.annotated_imported.as_deref(), Some("<snippet>atpA</snippet>"));
        let function = &row.domains.as_ref().unwrap()["UniProt"]["Function"];
        assert_eq!(function.annotated_text.as_deref(), Some("<snippet>kinase activity</snippet>"));
        assert!(table.result.genes[0].annotated_imported.is_none());

        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(json["data"]["organism"], "E. coli");
        assert_eq!(json["result"]["version"], "5");
        assert_eq!(json["result"]["genes"][1]["link"], "https://example.org/atpA");
        assert_eq!(json["result"]["genes"][1]["domains"]["UniProt"]["Function"]["link"], "u");
        assert!(json["result"]["genes"][1]["annotatedFullName"].is_string());
    }

    proptest! {
        #[test]
        fn prop_remapped_offsets_round_trip(
            cells in prop::collection::vec("[a-zé]{1,6}( [a-z]{1,6}){0,3}", 1..8),
            pick in prop::collection::vec(any::<prop::sample::Index>(), 8),
        ) {
            let descriptors: Vec<CellDescriptor> = cells
                .iter()
                .map(|t| cell(0, CellKind::Matched, t))
                .collect();
            let mapper = EnrichmentOffsetMapper::combine(descriptors);

            // Uma palavra de cada célula, em offsets do texto combinado
            let mut annotations = Vec::new();
            let mut start = 0;
            for (i, (end, c)) in mapper.cell_map().iter().enumerate() {
                let words: Vec<&str> = c.text.split(' ').collect();
                let w = pick[i].index(words.len());
                let offset: usize = words[..w].iter().map(|s| s.chars().count() + 1).sum();
                annotations.push(annotation(EntityType::Chemical, words[w], start + offset));
                start = end + 1;
            }

            for remapped in mapper.remap(annotations) {
                prop_assert_eq!(remapped.annotations.len(), 1);
                let offsets = CharOffsets::new(&remapped.cell.text);
                for a in &remapped.annotations {
                    let (lo, hi) = (a.lo_location_offset, a.hi_location_offset);
                    prop_assert_eq!(a.keyword_length, hi - lo + 1);
                    prop_assert_eq!(offsets.slice(&remapped.cell.text, lo, hi + 1), Some(a.keyword.as_str()));
                }
            }
        }
    }
}
