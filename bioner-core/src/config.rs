//! # Configuração do Anotador
//!
//! [`AnnotatorConfig`] reúne tudo que varia entre implantações: sensibilidade
//! a caixa por tipo, tabela de precedência, stop-words e política de
//! organismo. É passado explicitamente ao [`Pipeline`](crate::pipeline::Pipeline)
//! na construção; não existe estado global.
//!
//! ## Formato YAML
//!
//! ```yaml
//! entity_types:
//!   Gene: { case_sensitive: true, max_words: 1 }
//! precedence:
//!   Species: 12
//!   Gene: 11
//!   Chemical: 7
//! stop_words: [the, and, protein]
//! organism:
//!   distance_threshold: 200
//!   default_organism: "9606"
//!   unresolved: drop
//! ```
//!
//! Todo campo tem valor padrão; arquivos parciais são válidos.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::entity::{EntityType, COMMON_WORDS, HOMO_SAPIENS_TAX_ID};
use crate::error::{AnnotationError, Result};

/// Janela máxima padrão, em palavras, de um termo de dicionário.
pub const MAX_ENTITY_WORD_LENGTH: usize = 6;
/// Símbolos de gene são sempre uma palavra.
pub const MAX_GENE_WORD_LENGTH: usize = 1;
pub const MAX_FOOD_WORD_LENGTH: usize = 4;
/// Distância máxima (caracteres) para um organismo ser considerado contexto.
pub const ORGANISM_DISTANCE_THRESHOLD: usize = 200;

/// Ajustes de reconhecimento de um tipo de entidade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTypeSettings {
    /// Exige igualdade exata entre o texto e o sinônimo do dicionário.
    #[serde(default)]
    pub case_sensitive: bool,
    /// Maior janela de palavras consultada.
    #[serde(default = "default_max_words")]
    pub max_words: usize,
    /// Chaves normalizadas menores que isto nunca são consultadas.
    #[serde(default = "default_min_key_length")]
    pub min_key_length: usize,
}

fn default_max_words() -> usize {
    MAX_ENTITY_WORD_LENGTH
}

fn default_min_key_length() -> usize {
    3
}

impl EntityTypeSettings {
    /// Valores padrão de cada tipo.
    pub fn for_type(entity_type: EntityType) -> Self {
        let max_words = match entity_type {
            EntityType::Gene => MAX_GENE_WORD_LENGTH,
            EntityType::Food => MAX_FOOD_WORD_LENGTH,
            _ => MAX_ENTITY_WORD_LENGTH,
        };
        Self {
            case_sensitive: matches!(entity_type, EntityType::Gene | EntityType::Protein),
            max_words,
            min_key_length: default_min_key_length(),
        }
    }
}

/// O que fazer quando nenhuma regra escolhe um organismo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedOrganism {
    /// Descarta o candidato.
    #[default]
    Drop,
    /// Mantém a primeira entrada do dicionário.
    KeepFirst,
}

/// Política de desambiguação de genes e proteínas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganismPolicy {
    #[serde(default = "default_distance_threshold")]
    pub distance_threshold: usize,
    /// Organismo preferido quando o documento não decide (taxonomia NCBI).
    #[serde(default = "default_organism")]
    pub default_organism: Option<String>,
    #[serde(default)]
    pub unresolved: UnresolvedOrganism,
}

fn default_distance_threshold() -> usize {
    ORGANISM_DISTANCE_THRESHOLD
}

fn default_organism() -> Option<String> {
    Some(HOMO_SAPIENS_TAX_ID.to_string())
}

impl Default for OrganismPolicy {
    fn default() -> Self {
        Self {
            distance_threshold: default_distance_threshold(),
            default_organism: default_organism(),
            unresolved: UnresolvedOrganism::default(),
        }
    }
}

/// Configuração por requisição: quais tipos anotar e como.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationConfigs {
    /// Corta o documento no cabeçalho de referências bibliográficas.
    #[serde(default = "default_true")]
    pub exclude_references: bool,
    /// Tipos anotados por dicionário.
    #[serde(default)]
    pub annotation_methods: Vec<EntityType>,
    /// Tipos que exigem confirmação do preditor NLP.
    #[serde(default)]
    pub nlp_methods: Vec<EntityType>,
}

fn default_true() -> bool {
    true
}

impl Default for AnnotationConfigs {
    fn default() -> Self {
        Self {
            exclude_references: true,
            annotation_methods: vec![EntityType::Chemical, EntityType::Disease, EntityType::Gene],
            nlp_methods: Vec::new(),
        }
    }
}

/// Configuração completa do anotador.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatorConfig {
    /// Ajustes por tipo; tipos ausentes usam [`EntityTypeSettings::for_type`].
    #[serde(default)]
    pub entity_types: BTreeMap<EntityType, EntityTypeSettings>,
    /// Precedência de desempate; tipos ausentes valem 0.
    #[serde(default = "default_precedence")]
    pub precedence: BTreeMap<EntityType, u32>,
    /// Stop-words em minúsculas.
    #[serde(default = "default_stop_words")]
    pub stop_words: BTreeSet<String>,
    #[serde(default)]
    pub organism: OrganismPolicy,
    /// Usada quando a requisição não traz `annotation_configs`.
    #[serde(default)]
    pub default_annotation_configs: AnnotationConfigs,
}

fn default_precedence() -> BTreeMap<EntityType, u32> {
    EntityType::ALL
        .iter()
        .map(|t| (*t, t.default_precedence()))
        .collect()
}

fn default_stop_words() -> BTreeSet<String> {
    COMMON_WORDS.iter().map(|w| w.to_string()).collect()
}

impl AnnotatorConfig {
    pub fn new() -> Self {
        Self {
            entity_types: BTreeMap::new(),
            precedence: default_precedence(),
            stop_words: default_stop_words(),
            organism: OrganismPolicy::default(),
            default_annotation_configs: AnnotationConfigs::default(),
        }
    }

    /// Carrega de um arquivo YAML.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::load_from_str(&content)
    }

    /// Carrega de uma string YAML e valida.
    pub fn load_from_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| AnnotationError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (entity_type, settings) in &self.entity_types {
            if settings.max_words == 0 {
                return Err(AnnotationError::Config(format!(
                    "max_words de {entity_type} deve ser maior que zero"
                ))
                .into());
            }
        }
        Ok(())
    }

    pub fn settings(&self, entity_type: EntityType) -> EntityTypeSettings {
        self.entity_types
            .get(&entity_type)
            .cloned()
            .unwrap_or_else(|| EntityTypeSettings::for_type(entity_type))
    }

    pub fn precedence_of(&self, entity_type: EntityType) -> u32 {
        self.precedence.get(&entity_type).copied().unwrap_or(0)
    }

    pub fn is_stop_word(&self, text: &str) -> bool {
        self.stop_words.contains(&text.to_lowercase())
    }
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AnnotatorConfig::new();
        assert!(config.settings(EntityType::Gene).case_sensitive);
        assert_eq!(config.settings(EntityType::Gene).max_words, 1);
        assert_eq!(config.settings(EntityType::Food).max_words, 4);
        assert!(!config.settings(EntityType::Disease).case_sensitive);
        assert_eq!(config.precedence_of(EntityType::Species), 12);
        assert_eq!(config.organism.default_organism.as_deref(), Some("9606"));
        assert!(config.is_stop_word("The"), "Stop-words ignoram caixa");
        assert!(!config.is_stop_word("p53"));
    }

    #[test]
    fn test_partial_yaml() {
        let yaml = r#"
entity_types:
  Disease: { case_sensitive: true }
precedence:
  Chemical: 20
organism:
  unresolved: keep_first
"#;
        let config = AnnotatorConfig::load_from_str(yaml).unwrap();
        let disease = config.settings(EntityType::Disease);
        assert!(disease.case_sensitive);
        assert_eq!(disease.max_words, 6, "Campos omitidos usam o padrão");
        // Tabela fornecida substitui a padrão: tipos ausentes valem 0
        assert_eq!(config.precedence_of(EntityType::Chemical), 20);
        assert_eq!(config.precedence_of(EntityType::Gene), 0);
        assert_eq!(config.organism.unresolved, UnresolvedOrganism::KeepFirst);
        assert_eq!(config.organism.distance_threshold, 200);
        assert!(config.is_stop_word("and"));
    }

    #[test]
    fn test_rejects_zero_window() {
        let yaml = "entity_types:\n  Gene: { max_words: 0 }\n";
        let err = AnnotatorConfig::load_from_str(yaml).unwrap_err();
        assert!(err.is_domain());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "stop_words: [foo]").unwrap();
        let config = AnnotatorConfig::load_from_file(file.path()).unwrap();
        assert!(config.is_stop_word("FOO"));
        assert!(!config.is_stop_word("the"));
    }

    #[test]
    fn test_default_annotation_configs() {
        let configs: AnnotationConfigs = serde_json::from_str("{}").unwrap();
        assert!(configs.exclude_references);
        assert!(configs.annotation_methods.is_empty());

        let defaults = AnnotationConfigs::default();
        assert_eq!(
            defaults.annotation_methods,
            vec![EntityType::Chemical, EntityType::Disease, EntityType::Gene]
        );
    }
}
