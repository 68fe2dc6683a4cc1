//! # Pipeline de Anotação — Orquestrador com Eventos Observáveis
//!
//! Coordena todos os módulos numa única passada síncrona e emite um
//! [`PipelineEvent`] ao fim de cada etapa via canal `mpsc`, para que quem
//! chama (o worker, um teste) acompanhe o progresso.
//!
//! ## Etapas
//!
//! 1. **Parse**: texto cru ou arquivo → texto + tokens ([`DocumentParser`]).
//! 2. **Overrides**: exclusões, inclusões locais e inclusões globais.
//! 3. **Reconhecimento**: candidatos por tipo ([`RecognitionEngine`]), mais
//!    a varredura de espécies usada como contexto de organismo.
//! 4. **Organismos**: uma entrada por gene/proteína ([`OrganismResolver`]).
//! 5. **Fusão**: conjunto sem sobreposição ([`IntervalMerger`]).
//! 6. **Resolução**: inclusões, exclusões, nomes ([`AnnotationResolver`]).
//! 7. **Montagem**: [`AnnotatedDocument`].
//!
//! ## Modos de Uso
//!
//! - **Sync**: [`Pipeline::annotate`] e [`Pipeline::annotate_enrichment`].
//! - **Streaming**: [`Pipeline::annotate_streaming`], mesmo caminho,
//!   empurrando eventos pelo canal.

use std::sync::mpsc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::annotation::Annotation;
use crate::config::{AnnotationConfigs, AnnotatorConfig};
use crate::dictionary::EntityDictionary;
use crate::document::{AnnotatedDocument, DocumentAssembler};
use crate::enrichment::{EnrichmentOffsetMapper, EnrichmentTable};
use crate::entity::EntityType;
use crate::error::{Error, Result};
use crate::merge::IntervalMerger;
use crate::organism::{OrganismContext, OrganismResolver, SpecifiedOrganism};
use crate::parser::{DocumentParser, ParsedDocument, PlainTextParser};
use crate::recognition::{confirm_with_predictions, CandidateAnnotation, EntityPredictor, RecognitionEngine};
use crate::resolver::{
    global_overlay, parse_exclusions, parse_inclusions, AnnotationResolver, ResolutionStats,
};

/// Exclusões, inclusões e opções de uma requisição.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnnotationOverrides {
    #[serde(default)]
    pub global_exclusions: Vec<Value>,
    #[serde(default)]
    pub local_exclusions: Vec<Value>,
    #[serde(default)]
    pub local_inclusions: Vec<Value>,
    /// Termos anotados em qualquer posição do documento.
    #[serde(default)]
    pub global_inclusions: Vec<Value>,
    #[serde(default)]
    pub organism_synonym: Option<String>,
    #[serde(default)]
    pub organism_taxonomy_id: Option<String>,
    /// Ausente usa `default_annotation_configs` da configuração.
    #[serde(default)]
    pub annotation_configs: Option<AnnotationConfigs>,
}

/// Requisição de anotação: exatamente um entre `text` e `file_id`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnnotationRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, alias = "file_reference")]
    pub file_id: Option<String>,
    #[serde(flatten)]
    pub overrides: AnnotationOverrides,
}

impl AnnotationRequest {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn from_file(file_id: impl Into<String>) -> Self {
        Self {
            file_id: Some(file_id.into()),
            ..Self::default()
        }
    }

    /// Identificador para logs.
    pub fn document_label(&self) -> &str {
        self.file_id.as_deref().unwrap_or("<texto>")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationResponse {
    pub annotations: AnnotatedDocument,
}

/// Requisição de anotação de tabela de enriquecimento.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrichmentRequest {
    pub table: EnrichmentTable,
    #[serde(flatten)]
    pub overrides: AnnotationOverrides,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentResponse {
    /// Anotações com offsets relativos a cada célula.
    pub annotations: AnnotatedDocument,
    /// Tabela de entrada com os snippets `annotated*` preenchidos.
    pub enrichment_annotations: EnrichmentTable,
}

/// Eventos emitidos durante o processamento.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PipelineEvent {
    /// **Passo 1**: documento lido e tokenizado.
    Parsed {
        document_id: Option<String>,
        characters: usize,
        tokens: usize,
    },
    /// **Passo 2**: registros de exclusão e inclusão interpretados.
    OverridesLoaded {
        exclusions: usize,
        inclusions: usize,
        global_inclusions: usize,
        skipped: usize,
    },
    /// **Passo 3**: candidatos encontrados (ainda sobrepostos).
    CandidatesFound {
        entity_types: Vec<EntityType>,
        candidates: usize,
        species_mentions: usize,
    },
    /// **Passo 4**: genes e proteínas com organismo escolhido.
    OrganismsResolved {
        most_frequent: Option<String>,
        candidates: usize,
    },
    /// **Passo 5**: conjunto sem sobreposição.
    Merged {
        annotations: usize,
    },
    /// **Passo 6**: inclusões, exclusões e nomes primários aplicados.
    Resolved {
        annotations: usize,
        stats: ResolutionStats,
    },
    /// **Conclusão**: documento final e tempo total.
    Done {
        document: AnnotatedDocument,
        processing_ms: u64,
    },
    /// **Falha**: nada de resultado parcial.
    Error {
        message: String,
        retryable: bool,
    },
}

fn emit(tx: Option<&mpsc::Sender<PipelineEvent>>, event: PipelineEvent) {
    if let Some(tx) = tx {
        // receptor fechado não interrompe a anotação
        let _ = tx.send(event);
    }
}

/// Origem do texto.
#[derive(Clone, Copy)]
enum Source<'a> {
    Text(&'a str),
    File(&'a str),
    /// Células concatenadas; nenhum termo atravessa `boundaries`.
    Cells { text: &'a str, boundaries: &'a [usize] },
}

/// O pipeline de anotação.
///
/// Recebe dicionários, parser e configuração na construção; não há estado
/// global. Cada chamada é independente e descarta seus dados ao terminar.
pub struct Pipeline<D: EntityDictionary, P: DocumentParser = PlainTextParser> {
    dictionary: D,
    parser: P,
    config: AnnotatorConfig,
    predictor: Option<Box<dyn EntityPredictor>>,
    assembler: DocumentAssembler,
}

impl<D: EntityDictionary, P: DocumentParser> Pipeline<D, P> {
    pub fn new(dictionary: D, parser: P, config: AnnotatorConfig) -> Self {
        Self {
            dictionary,
            parser,
            config,
            predictor: None,
            assembler: DocumentAssembler::new(),
        }
    }

    /// Liga o preditor NLP usado pelos tipos em `nlp_methods`.
    pub fn with_predictor(mut self, predictor: Box<dyn EntityPredictor>) -> Self {
        self.predictor = Some(predictor);
        self
    }

    pub fn with_assembler(mut self, assembler: DocumentAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn config(&self) -> &AnnotatorConfig {
        &self.config
    }

    pub fn dictionary(&self) -> &D {
        &self.dictionary
    }

    /// Anota um texto ou arquivo.
    pub fn annotate(&self, request: &AnnotationRequest) -> Result<AnnotationResponse> {
        self.annotate_observed(request, None)
    }

    /// Igual a [`Pipeline::annotate`], emitindo eventos em `tx`.
    ///
    /// Em caso de erro, `PipelineEvent::Error` é enviado e o erro também
    /// é devolvido.
    pub fn annotate_streaming(
        &self,
        request: &AnnotationRequest,
        tx: mpsc::Sender<PipelineEvent>,
    ) -> Result<AnnotationResponse> {
        self.annotate_observed(request, Some(&tx))
    }

    fn annotate_observed(
        &self,
        request: &AnnotationRequest,
        tx: Option<&mpsc::Sender<PipelineEvent>>,
    ) -> Result<AnnotationResponse> {
        let result = request_source(request).and_then(|source| self.run(source, &request.overrides, tx));
        self.finish(request.document_label(), result, tx)
            .map(|annotations| AnnotationResponse { annotations })
    }

    /// Anota todas as células de uma tabela de enriquecimento de uma vez.
    pub fn annotate_enrichment(&self, request: EnrichmentRequest) -> Result<EnrichmentResponse> {
        let EnrichmentRequest { mut table, mut overrides } = request;
        let mapper = EnrichmentOffsetMapper::from_table(&table);

        // tabela não tem seção de referências
        let mut configs = self.effective_configs(&overrides);
        configs.exclude_references = false;
        overrides.annotation_configs = Some(configs);

        let boundaries = mapper.boundaries();
        let source = Source::Cells {
            text: mapper.text(),
            boundaries: &boundaries,
        };
        let result = self.run(source, &overrides, None);
        let mut document = self.finish("<tabela de enriquecimento>", result, None)?;

        let start = Instant::now();
        let mut remapped = 0;
        if let Some(annotations) = document.annotations_mut() {
            let combined = std::mem::take(annotations);
            *annotations = mapper.apply(combined, &mut table);
            remapped = annotations.len();
        }
        info!(
            cells = mapper.cell_map().len(),
            annotations = remapped,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "snippets de enriquecimento gerados"
        );

        Ok(EnrichmentResponse {
            annotations: document,
            enrichment_annotations: table,
        })
    }

    fn effective_configs(&self, overrides: &AnnotationOverrides) -> AnnotationConfigs {
        overrides
            .annotation_configs
            .clone()
            .unwrap_or_else(|| self.config.default_annotation_configs.clone())
    }

    fn finish(
        &self,
        label: &str,
        result: Result<AnnotatedDocument>,
        tx: Option<&mpsc::Sender<PipelineEvent>>,
    ) -> Result<AnnotatedDocument> {
        if let Err(e) = &result {
            if e.is_domain() {
                error!(document = label, error = %e, "documento não pôde ser anotado");
            } else {
                error!(document = label, error = ?e, "erro inesperado ao anotar documento");
            }
            emit(
                tx,
                PipelineEvent::Error {
                    message: e.to_string(),
                    retryable: e.is_retryable(),
                },
            );
        }
        result
    }

    fn run(
        &self,
        source: Source<'_>,
        overrides: &AnnotationOverrides,
        tx: Option<&mpsc::Sender<PipelineEvent>>,
    ) -> Result<AnnotatedDocument> {
        let start = Instant::now();
        let configs = self.effective_configs(overrides);

        // === Passo 1: Parse ===
        let step = Instant::now();
        let parsed: ParsedDocument = match source {
            Source::Text(text) | Source::Cells { text, .. } => {
                self.parser.parse_text(text, configs.exclude_references)?
            }
            Source::File(file_id) => self.parser.parse_file(file_id, configs.exclude_references)?,
        };
        let boundaries: &[usize] = match source {
            Source::Cells { boundaries, .. } => boundaries,
            _ => &[],
        };
        info!(
            document = parsed.file_id.as_deref().unwrap_or("<texto>"),
            tokens = parsed.tokens.len(),
            elapsed_ms = step.elapsed().as_millis() as u64,
            "documento lido"
        );
        emit(
            tx,
            PipelineEvent::Parsed {
                document_id: parsed.file_id.clone(),
                characters: parsed.text.chars().count(),
                tokens: parsed.tokens.len(),
            },
        );

        // === Passo 2: Exclusões e inclusões ===
        let step = Instant::now();
        let mut exclusions = parse_exclusions(&overrides.global_exclusions);
        exclusions.extend(parse_exclusions(&overrides.local_exclusions));
        let inclusions = parse_inclusions(&overrides.local_inclusions);
        let global_inclusions = parse_inclusions(&overrides.global_inclusions);
        let overlay = global_overlay(inclusions.iter().chain(global_inclusions.iter()));
        let raw_total = overrides.global_exclusions.len()
            + overrides.local_exclusions.len()
            + overrides.local_inclusions.len()
            + overrides.global_inclusions.len();
        let skipped = raw_total - exclusions.len() - inclusions.len() - global_inclusions.len();
        info!(
            exclusions = exclusions.len(),
            inclusions = inclusions.len(),
            skipped,
            elapsed_ms = step.elapsed().as_millis() as u64,
            "overrides carregados"
        );
        emit(
            tx,
            PipelineEvent::OverridesLoaded {
                exclusions: exclusions.len(),
                inclusions: inclusions.len(),
                global_inclusions: global_inclusions.len(),
                skipped,
            },
        );

        // === Passo 3: Reconhecimento ===
        let step = Instant::now();
        let types = requested_types(&configs);
        let species_for_context = !types.contains(&EntityType::Species)
            && types.iter().any(EntityType::is_organism_dependent)
            && self.dictionary.ensure_available(EntityType::Species).is_ok();
        let mut scan_types = types.clone();
        if species_for_context {
            scan_types.push(EntityType::Species);
        }

        let mut engine = RecognitionEngine::new(&self.dictionary, &self.config);
        if !overlay.is_empty() {
            engine = engine.with_overlay(&overlay);
        }
        if !boundaries.is_empty() {
            engine = engine.with_boundaries(boundaries);
        }
        let mut candidates = engine.recognize(&parsed.text, &parsed.tokens, &scan_types)?;

        let species: Vec<CandidateAnnotation> = candidates
            .iter()
            .filter(|c| c.entity_type == EntityType::Species)
            .cloned()
            .collect();
        if species_for_context {
            candidates.retain(|c| c.entity_type != EntityType::Species);
        }
        candidates = self.confirm_nlp(&parsed.text, candidates, &configs.nlp_methods)?;
        info!(
            candidates = candidates.len(),
            species = species.len(),
            elapsed_ms = step.elapsed().as_millis() as u64,
            "reconhecimento concluído"
        );
        emit(
            tx,
            PipelineEvent::CandidatesFound {
                entity_types: types,
                candidates: candidates.len(),
                species_mentions: species.len(),
            },
        );

        // === Passo 4: Organismos ===
        let specified = match (
            overrides.organism_synonym.as_deref().filter(|s| !s.is_empty()),
            overrides.organism_taxonomy_id.as_deref().filter(|s| !s.is_empty()),
        ) {
            (Some(synonym), Some(tax_id)) => Some(SpecifiedOrganism::lookup(&self.dictionary, synonym, tax_id)),
            _ => None,
        };
        let resolver = OrganismResolver::new(&self.config.organism, OrganismContext::from_species(&species))
            .with_specified(specified);
        let candidates = resolver.resolve(candidates);
        emit(
            tx,
            PipelineEvent::OrganismsResolved {
                most_frequent: resolver.context().most_frequent().map(str::to_string),
                candidates: candidates.len(),
            },
        );

        // === Passo 5: Fusão ===
        let step = Instant::now();
        let merged: Vec<Annotation> = IntervalMerger::from_config(&self.config)
            .merge(candidates)
            .into_iter()
            .map(Annotation::from_candidate)
            .collect();
        info!(
            annotations = merged.len(),
            elapsed_ms = step.elapsed().as_millis() as u64,
            "candidatos fundidos"
        );
        emit(tx, PipelineEvent::Merged { annotations: merged.len() });

        // === Passo 6: Resolução ===
        let step = Instant::now();
        let (annotations, stats) = AnnotationResolver::new(&self.dictionary, &self.config).resolve(
            &parsed.text,
            merged,
            &inclusions,
            &exclusions,
        );
        info!(
            annotations = annotations.len(),
            excluded = stats.excluded,
            custom = stats.inclusions_applied,
            elapsed_ms = step.elapsed().as_millis() as u64,
            "anotações resolvidas"
        );
        emit(
            tx,
            PipelineEvent::Resolved {
                annotations: annotations.len(),
                stats,
            },
        );

        // === Passo 7: Montagem ===
        let document = self
            .assembler
            .assemble(parsed.file_id.as_deref(), parsed.text, annotations);
        let processing_ms = start.elapsed().as_millis() as u64;
        info!(document = %document.id, processing_ms, "documento anotado");
        emit(
            tx,
            PipelineEvent::Done {
                document: document.clone(),
                processing_ms,
            },
        );
        Ok(document)
    }

    /// Filtra os tipos NLP pelo preditor; sem preditor, segue só com dicionário.
    fn confirm_nlp(
        &self,
        text: &str,
        candidates: Vec<CandidateAnnotation>,
        nlp_types: &[EntityType],
    ) -> Result<Vec<CandidateAnnotation>> {
        if nlp_types.is_empty() {
            return Ok(candidates);
        }
        match &self.predictor {
            Some(predictor) => {
                let predictions = predictor.predict(text, nlp_types)?;
                Ok(confirm_with_predictions(candidates, nlp_types, &predictions))
            }
            None => {
                warn!(types = ?nlp_types, "preditor NLP não configurado, usando apenas dicionário");
                Ok(candidates)
            }
        }
    }
}

fn request_source(request: &AnnotationRequest) -> Result<Source<'_>> {
    match (request.text.as_deref(), request.file_id.as_deref()) {
        (Some(text), None) => Ok(Source::Text(text)),
        (None, Some(file_id)) => Ok(Source::File(file_id)),
        (Some(_), Some(_)) => Err(Error::invalid_request("informe apenas um entre 'text' e 'file_id'")),
        (None, None) => Err(Error::invalid_request("requisição sem 'text' nem 'file_id'")),
    }
}

/// Tipos pedidos (dicionário e NLP), sem repetição, na ordem declarada.
fn requested_types(configs: &AnnotationConfigs) -> Vec<EntityType> {
    EntityType::ALL
        .iter()
        .copied()
        .filter(|t| configs.annotation_methods.contains(t) || configs.nlp_methods.contains(t))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::{entry, MemoryDictionary};
    use crate::error::AnnotationError;
    use crate::recognition::PredictedSpan;
    use serde_json::json;

    fn gene(id: &str, symbol: &str, organism: &str) -> crate::dictionary::DictionaryEntry {
        let mut e = entry(id, "NCBI Gene", symbol, symbol);
        e.organism_id = Some(organism.to_string());
        e
    }

    fn dictionary() -> MemoryDictionary {
        let mut dict = MemoryDictionary::new();
        dict.insert(EntityType::Disease, entry("MESH:D001943", "MESH", "Breast Neoplasms", "breast cancer"));
        dict.insert(EntityType::Disease, entry("MESH:D009369", "MESH", "Neoplasms", "cancer"));
        dict.insert(EntityType::Chemical, entry("CHEBI:15422", "CHEBI", "adenosine triphosphate", "ATP"));
        dict.insert(EntityType::Gene, gene("7157", "TP53", "9606"));
        dict.insert(EntityType::Gene, gene("22059", "TP53", "10090"));
        let mut human = entry("9606", "NCBI Taxonomy", "Homo sapiens", "human");
        human.category = Some("Eukaryota".into());
        dict.insert(EntityType::Species, human);
        let mut mouse = entry("10090", "NCBI Taxonomy", "Mus musculus", "mouse");
        mouse.category = Some("Eukaryota".into());
        dict.insert(EntityType::Species, mouse);
        dict
    }

    fn pipeline() -> Pipeline<MemoryDictionary> {
        Pipeline::new(dictionary(), PlainTextParser::new(), AnnotatorConfig::new())
    }

    fn request(text: &str, types: &[EntityType]) -> AnnotationRequest {
        let mut request = AnnotationRequest::from_text(text);
        request.overrides.annotation_configs = Some(AnnotationConfigs {
            exclude_references: false,
            annotation_methods: types.to_vec(),
            nlp_methods: vec![],
        });
        request
    }

    fn summary(response: &AnnotationResponse) -> Vec<(String, EntityType, usize, usize)> {
        response
            .annotations
            .annotations()
            .iter()
            .map(|a| (a.keyword.clone(), a.meta.entity_type, a.lo(), a.hi()))
            .collect()
    }

    #[test]
    fn test_pipeline_basic() {
        let text = "Patients with breast cancer received ATP.";
        let response = pipeline()
            .annotate(&request(text, &[EntityType::Chemical, EntityType::Disease]))
            .unwrap();
        assert_eq!(
            summary(&response),
            vec![
                ("breast cancer".to_string(), EntityType::Disease, 14, 27),
                ("ATP".to_string(), EntityType::Chemical, 37, 40),
            ]
        );
        let annotations = response.annotations.annotations();
        assert_eq!(annotations[0].primary_name, "Breast Neoplasms");
        assert_eq!(annotations[1].primary_name, "adenosine triphosphate");
        assert_eq!(response.annotations.documents[0].passages[0].text, text);
    }

    #[test]
    fn test_pipeline_empty() {
        let response = pipeline().annotate(&request("", &[EntityType::Disease])).unwrap();
        assert!(response.annotations.annotations().is_empty());
    }

    #[test]
    fn test_pipeline_events_streaming() {
        let (tx, rx) = mpsc::channel();
        pipeline()
            .annotate_streaming(&request("ATP and cancer", &[EntityType::Chemical, EntityType::Disease]), tx)
            .unwrap();
        let events: Vec<PipelineEvent> = rx.iter().collect();
        let names: Vec<String> = events
            .iter()
            .map(|e| serde_json::to_value(e).unwrap()["type"].as_str().unwrap_or("").to_string())
            .collect();
        assert_eq!(
            names,
            vec!["Parsed", "OverridesLoaded", "CandidatesFound", "OrganismsResolved", "Merged", "Resolved", "Done"]
        );
        match events.last() {
            Some(PipelineEvent::Done { document, .. }) => assert_eq!(document.annotations().len(), 2),
            other => panic!("Último evento deveria ser Done: {other:?}"),
        }
    }

    #[test]
    fn test_request_needs_exactly_one_source() {
        let mut request = request("ATP", &[EntityType::Chemical]);
        request.file_id = Some("doc".into());
        let err = pipeline().annotate(&request).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
        assert!(!err.is_retryable());

        let err = pipeline().annotate(&AnnotationRequest::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn test_unavailable_dictionary_fails_whole_request() {
        let (tx, rx) = mpsc::channel();
        let err = pipeline()
            .annotate_streaming(&request("some food here", &[EntityType::Disease, EntityType::Food]), tx)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Annotation(AnnotationError::DictionaryUnavailable { entity_type: EntityType::Food, .. })
        ));
        let events: Vec<PipelineEvent> = rx.iter().collect();
        assert!(matches!(events.last(), Some(PipelineEvent::Error { retryable: false, .. })));
        assert!(!events.iter().any(|e| matches!(e, PipelineEvent::Done { .. })));
    }

    #[test]
    fn test_gene_follows_nearby_species() {
        let response = pipeline()
            .annotate(&request("In mouse cells TP53 was silenced.", &[EntityType::Gene]))
            .unwrap();
        let annotations = response.annotations.annotations();
        assert_eq!(annotations.len(), 1, "Espécies são só contexto quando não pedidas");
        assert_eq!(annotations[0].meta.id, "22059");
        assert_eq!(annotations[0].meta.category.as_deref(), Some("Eukaryota"));
    }

    #[test]
    fn test_gene_uses_specified_organism_when_no_species_nearby() {
        let mut request = request("TP53 was silenced.", &[EntityType::Gene]);
        request.overrides.organism_synonym = Some("mouse".into());
        request.overrides.organism_taxonomy_id = Some("10090".into());
        let response = pipeline().annotate(&request).unwrap();
        assert_eq!(response.annotations.annotations()[0].meta.id, "22059");

        // sem organismo informado cai no organismo padrão (humano)
        let response = pipeline().annotate(&self::request("TP53 was silenced.", &[EntityType::Gene])).unwrap();
        assert_eq!(response.annotations.annotations()[0].meta.id, "7157");
    }

    #[test]
    fn test_overrides_from_raw_json() {
        let mut request = request("ATP and breast cancer and Zyxin-X", &[EntityType::Chemical, EntityType::Disease]);
        request.overrides.global_exclusions = vec![json!({"type": "Chemical", "id": "CHEBI:15422"}), json!({"bad": true})];
        request.overrides.local_inclusions = vec![
            json!({"type": "Gene", "id": "g1", "text": "breast", "lo": 8, "hi": 14}),
        ];
        request.overrides.global_inclusions = vec![json!({"type": "Chemical", "text": "Zyxin-X", "includeGlobally": true})];

        let response = pipeline().annotate(&request).unwrap();
        assert_eq!(
            summary(&response),
            vec![
                ("breast".to_string(), EntityType::Gene, 8, 14),
                ("Zyxin-X".to_string(), EntityType::Chemical, 26, 33),
            ],
            "ATP excluído, doença sobreposta substituída pela inclusão"
        );
        let annotations = response.annotations.annotations();
        assert!(annotations[0].meta.is_custom);
        assert!(annotations[1].meta.include_globally);
    }

    #[test]
    fn test_request_wire_shape() {
        let request: AnnotationRequest = serde_json::from_value(json!({
            "file_reference": "paper-1",
            "global_exclusions": [{"type": "Gene", "text": "ATP"}],
            "organism_synonym": "human",
            "organism_taxonomy_id": "9606",
            "annotation_configs": {"exclude_references": false, "annotation_methods": ["Gene", "Lab Strain"]}
        }))
        .unwrap();
        assert_eq!(request.file_id.as_deref(), Some("paper-1"));
        assert_eq!(request.overrides.global_exclusions.len(), 1);
        let configs = request.overrides.annotation_configs.unwrap();
        assert_eq!(configs.annotation_methods, vec![EntityType::Gene, EntityType::LabStrain]);
    }

    struct FixedPredictor(Vec<PredictedSpan>);

    impl EntityPredictor for FixedPredictor {
        fn predict(&self, _text: &str, _types: &[EntityType]) -> Result<Vec<PredictedSpan>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_nlp_types_need_prediction() {
        let text = "ATP and ATP";
        let mut req = request(text, &[]);
        if let Some(configs) = req.overrides.annotation_configs.as_mut() {
            configs.nlp_methods = vec![EntityType::Chemical];
        }
        let predictor = FixedPredictor(vec![PredictedSpan { entity_type: EntityType::Chemical, lo: 8, hi: 11 }]);
        let response = pipeline().with_predictor(Box::new(predictor)).annotate(&req).unwrap();
        assert_eq!(summary(&response), vec![("ATP".to_string(), EntityType::Chemical, 8, 11)]);

        // sem preditor: só dicionário
        let response = pipeline().annotate(&req).unwrap();
        assert_eq!(response.annotations.annotations().len(), 2);
    }

    #[test]
    fn test_enrichment_table() {
        let table: EnrichmentTable = serde_json::from_value(json!({
            "result": {"genes": [{
                "imported": "ATP",
                "matched": "ATP",
                "fullName": "breast cancer marker",
                "domains": {"UniProt": {"Function": {"text": "binds ATP"}}}
            }]}
        }))
        .unwrap();
        let mut overrides = AnnotationOverrides::default();
        overrides.annotation_configs = Some(AnnotationConfigs {
            exclude_references: true,
            annotation_methods: vec![EntityType::Chemical, EntityType::Disease],
            nlp_methods: vec![],
        });
        let response = pipeline()
            .annotate_enrichment(EnrichmentRequest { table, overrides })
            .unwrap();

        let annotations = response.annotations.annotations();
        assert_eq!(annotations.len(), 4);
        let function = annotations.last().unwrap();
        assert_eq!((function.lo(), function.hi()), (6, 9));
        assert_eq!(function.enrichment_gene.as_deref(), Some("ATP"));
        assert_eq!(function.enrichment_domain.as_ref().map(|d| d.domain.as_str()), Some("UniProt"));

        let row = &response.enrichment_annotations.result.genes[0];
        assert!(row.annotated_full_name.as_deref().unwrap().starts_with("<snippet><annotation type=\"Disease\""));
        assert!(row.annotated_matched.as_deref().unwrap().contains(">ATP</annotation></snippet>"));
    }

    fn enrichment_request(row: serde_json::Value, types: &[EntityType]) -> EnrichmentRequest {
        let table: EnrichmentTable = serde_json::from_value(json!({"result": {"genes": [row]}})).unwrap();
        let mut overrides = AnnotationOverrides::default();
        overrides.annotation_configs = Some(AnnotationConfigs {
            exclude_references: false,
            annotation_methods: types.to_vec(),
            nlp_methods: vec![],
        });
        EnrichmentRequest { table, overrides }
    }

    #[test]
    fn test_enrichment_offsets_point_inside_cells() {
        let row = json!({
            "imported": "ATP",
            "matched": "ATP",
            "fullName": "breast cancer marker",
            "domains": {"UniProt": {"Function": {"text": "binds ATP"}}}
        });
        let response = pipeline()
            .annotate_enrichment(enrichment_request(row, &[EntityType::Chemical, EntityType::Disease]))
            .unwrap();

        let cell_text = |a: &Annotation| -> &'static str {
            match a.enrichment_domain.as_ref().map(|d| d.domain.as_str()) {
                Some("Imported") | Some("Matched") => "ATP",
                Some("Full Name") => "breast cancer marker",
                Some("UniProt") => "binds ATP",
                other => panic!("Domínio inesperado: {other:?}"),
            }
        };
        let annotations = response.annotations.annotations();
        assert_eq!(annotations.len(), 4);
        for a in annotations {
            let chars: Vec<char> = cell_text(a).chars().collect();
            let (lo, hi) = (a.lo_location_offset, a.hi_location_offset);
            assert!(hi < chars.len(), "hiLocationOffset {hi} passa do fim da célula");
            assert_eq!(hi - lo + 1, a.keyword_length);
            let found: String = chars[lo..=hi].iter().collect();
            assert_eq!(found, a.keyword);
        }
        let disease = annotations.iter().find(|a| a.meta.entity_type == EntityType::Disease).unwrap();
        assert_eq!((disease.lo_location_offset, disease.hi_location_offset), (0, 12));
    }

    #[test]
    fn test_enrichment_term_never_spans_cells() {
        let mut dict = dictionary();
        dict.insert(EntityType::Chemical, entry("CHEBI:0001", "CHEBI", "ATP synthase", "ATP synthase"));
        let pipeline = Pipeline::new(dict, PlainTextParser::new(), AnnotatorConfig::new());
        // "ATP" (Matched) seguido de "synthase subunit" (Full Name)
        let row = json!({"imported": "atpA", "matched": "ATP", "fullName": "synthase subunit"});
        let response = pipeline
            .annotate_enrichment(enrichment_request(row, &[EntityType::Chemical]))
            .unwrap();

        let annotations = response.annotations.annotations();
        assert_eq!(annotations.len(), 1, "ATP da célula Matched não pode se perder");
        assert_eq!(annotations[0].keyword, "ATP");
        assert_eq!(annotations[0].meta.id, "CHEBI:15422");
        assert_eq!((annotations[0].lo_location_offset, annotations[0].hi_location_offset), (0, 2));

        let row = &response.enrichment_annotations.result.genes[0];
        assert!(row.annotated_matched.as_deref().unwrap_or("").contains(">ATP</annotation></snippet>"));
        assert_eq!(row.annotated_full_name.as_deref(), Some("<snippet>synthase subunit</snippet>"));
    }
}
