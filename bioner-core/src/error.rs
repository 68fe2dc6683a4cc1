//! # Erros do Pipeline de Anotação
//!
//! Dois níveis de erro:
//!
//! - [`AnnotationError`]: falhas do domínio (documento ilegível, dicionário
//!   indisponível, configuração inválida). Nunca adianta tentar de novo.
//! - [`Error`]: erro geral do crate, que envolve o erro de domínio e acrescenta
//!   requisições malformadas, I/O e falhas inesperadas.
//!
//! Registros de inclusão/exclusão malformados **não** viram erro: são
//! descartados individualmente e registrados em log.

use thiserror::Error;

use crate::entity::EntityType;

/// Result padrão das operações do crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Erros do domínio de anotação.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AnnotationError {
    /// O documento de origem não pôde ser lido ou interpretado.
    #[error("documento '{document}' não pôde ser interpretado: {reason}")]
    Unparsable { document: String, reason: String },

    /// O dicionário de um tipo habilitado não pôde ser aberto.
    #[error("dicionário de {entity_type} indisponível: {reason}")]
    DictionaryUnavailable {
        entity_type: EntityType,
        reason: String,
    },

    /// Configuração rejeitada na validação.
    #[error("configuração inválida: {0}")]
    Config(String),
}

impl AnnotationError {
    #[must_use]
    pub fn unparsable(document: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unparsable {
            document: document.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn dictionary_unavailable(entity_type: EntityType, reason: impl Into<String>) -> Self {
        Self::DictionaryUnavailable {
            entity_type,
            reason: reason.into(),
        }
    }
}

/// Erro geral do crate.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Erro do domínio de anotação.
    #[error(transparent)]
    Annotation(#[from] AnnotationError),

    /// Requisição estruturalmente inválida (JSON quebrado, campo obrigatório ausente).
    #[error("requisição inválida: {0}")]
    InvalidRequest(String),

    /// Erro de I/O.
    #[error("erro de I/O: {0}")]
    Io(#[from] std::io::Error),

    /// Qualquer outra falha.
    #[error("erro inesperado: {0}")]
    Unexpected(String),
}

impl Error {
    #[must_use]
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    #[must_use]
    pub fn unexpected(msg: impl Into<String>) -> Self {
        Self::Unexpected(msg.into())
    }

    /// `true` para erros originados no domínio de anotação.
    pub fn is_domain(&self) -> bool {
        matches!(self, Error::Annotation(_))
    }

    /// Indica se repetir a mesma requisição pode ter outro resultado.
    ///
    /// Requisições malformadas e erros de domínio são determinísticos.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Io(_) | Error::Unexpected(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidRequest(err.to_string())
    }
}
