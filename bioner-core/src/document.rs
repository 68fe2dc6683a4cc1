//! # Documento Anotado
//!
//! Estrutura de saída no estilo BioC:
//!
//! ```json
//! {
//!   "id": "arquivo-ou-uuid",
//!   "date": "2024-05-01T12:00:00+00:00",
//!   "documents": [
//!     { "id": "...", "passages": [ { "text": "...", "annotations": [ ... ] } ] }
//!   ]
//! }
//! ```
//!
//! Visualizadores e o diff de histórico dependem desses nomes e desse
//! aninhamento. Mudar o formato exige nova versão do contrato.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::annotation::Annotation;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub text: String,
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiocDocument {
    pub id: String,
    pub passages: Vec<Passage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedDocument {
    pub id: String,
    /// RFC 3339, UTC.
    pub date: String,
    pub documents: Vec<BiocDocument>,
}

impl AnnotatedDocument {
    /// Anotações da primeira passagem (a única que o pipeline produz).
    pub fn annotations(&self) -> &[Annotation] {
        self.documents
            .first()
            .and_then(|d| d.passages.first())
            .map(|p| p.annotations.as_slice())
            .unwrap_or(&[])
    }

    pub fn annotations_mut(&mut self) -> Option<&mut Vec<Annotation>> {
        self.documents
            .first_mut()
            .and_then(|d| d.passages.first_mut())
            .map(|p| &mut p.annotations)
    }
}

/// Monta o [`AnnotatedDocument`] final.
#[derive(Debug, Clone, Default)]
pub struct DocumentAssembler {
    /// Data fixa; `None` usa o relógio.
    fixed_date: Option<DateTime<Utc>>,
}

impl DocumentAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_date(date: DateTime<Utc>) -> Self {
        Self { fixed_date: Some(date) }
    }

    /// `file_id` ausente (texto cru) gera um UUID v4.
    pub fn assemble(&self, file_id: Option<&str>, text: String, annotations: Vec<Annotation>) -> AnnotatedDocument {
        let id = file_id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let date = self
            .fixed_date
            .unwrap_or_else(Utc::now)
            .to_rfc3339_opts(SecondsFormat::Secs, false);
        AnnotatedDocument {
            id: id.clone(),
            date,
            documents: vec![BiocDocument {
                id,
                passages: vec![Passage { text, annotations }],
            }],
        }
    }
}
