//! # bioner-core — Anotação de Entidades Biomédicas em Documentos
//!
//! Este crate identifica menções de entidades biológicas (genes, proteínas,
//! compostos químicos, doenças, espécies, anatomia, alimentos, fenótipos e
//! termos do usuário) num documento e produz um conjunto de anotações **sem
//! sobreposição**, com offsets de caractere exatos, pronto para destaque em
//! um visualizador.
//!
//! ## Arquitetura do Sistema
//!
//! Pipeline linear; cada etapa consome a saída da anterior:
//!
//! 1.  **Parse** ([`parser`], [`tokenizer`]): texto ou documento pré-extraído vira tokens com offsets, página e retângulos.
//! 2.  **Reconhecimento** ([`recognition`]): janelas de tokens consultadas nos dicionários ([`dictionary`]), mais longas primeiro.
//! 3.  **Organismos** ([`organism`]): genes e proteínas ganham o organismo mencionado mais perto.
//! 4.  **Fusão** ([`merge`]): árvore de intervalos + desempate comprimento → precedência.
//! 5.  **Resolução** ([`resolver`]): inclusões do usuário, exclusões e nome primário.
//! 6.  **Saída** ([`document`]): [`AnnotatedDocument`] no formato BioC.
//!
//! Tabelas de enriquecimento ([`enrichment`]) passam pelo mesmo pipeline
//! num texto combinado e voltam às suas células.
//!
//! ## Exemplo de Uso
//!
//! ```rust
//! use bioner_core::{AnnotationRequest, AnnotatorConfig, EntityType, MemoryDictionary, Pipeline, PlainTextParser};
//! use bioner_core::dictionary::DictionaryEntry;
//!
//! // 1. Dicionários (normalmente carregados com MemoryDictionary::open_dir)
//! let mut dictionary = MemoryDictionary::new();
//! dictionary.insert(EntityType::Chemical, DictionaryEntry {
//!     id: "CHEBI:15422".into(),
//!     id_type: "CHEBI".into(),
//!     name: "ATP".into(),
//!     synonym: "ATP".into(),
//!     category: None,
//!     organism_id: None,
//!     hyperlinks: vec![],
//! });
//! dictionary.register_type(EntityType::Disease);
//! dictionary.register_type(EntityType::Gene);
//!
//! // 2. Pipeline com a configuração padrão
//! let pipeline = Pipeline::new(dictionary, PlainTextParser::new(), AnnotatorConfig::new());
//!
//! // 3. Anota um texto cru
//! let response = pipeline.annotate(&AnnotationRequest::from_text("Cells released ATP.")).unwrap();
//!
//! for annotation in response.annotations.annotations() {
//!     println!("{} [{}, {}) {}", annotation.keyword, annotation.lo(), annotation.hi(), annotation.meta.entity_type);
//! }
//! ```
//!
//! ## Módulos Principais
//!
//! - [`pipeline`]: Orquestrador que conecta todas as etapas e emite eventos.
//! - [`config`]: Configuração explícita (precedência, stop-words, organismos).
//! - [`error`]: Erros de domínio e erros inesperados.

pub mod annotation;
pub mod config;
pub mod dictionary;
pub mod document;
pub mod enrichment;
pub mod entity;
pub mod error;
pub mod merge;
pub mod organism;
pub mod parser;
pub mod pipeline;
pub mod recognition;
pub mod resolver;
pub mod tokenizer;

pub use annotation::{Annotation, Meta};
pub use config::{AnnotationConfigs, AnnotatorConfig};
pub use dictionary::{EntityDictionary, MemoryDictionary};
pub use document::AnnotatedDocument;
pub use entity::EntityType;
pub use error::{AnnotationError, Error, Result};
pub use parser::{DocumentParser, PlainTextParser};
pub use pipeline::{
    AnnotationRequest, AnnotationResponse, EnrichmentRequest, EnrichmentResponse, Pipeline, PipelineEvent,
};
pub use tokenizer::Token;
