//! # Dicionários de Entidades
//!
//! Um dicionário por tipo de entidade mapeia a **chave normalizada** de um
//! termo ([`normalize_str`]) para uma ou mais entradas `{id, id_type, nome}`.
//! A mesma chave pode ter várias entradas: o símbolo "TP53" existe para
//! humano, camundongo, rato...
//!
//! O armazenamento real é externo; o anotador só enxerga o trait
//! [`EntityDictionary`]. [`MemoryDictionary`] é a implementação em memória,
//! carregada de um diretório com um arquivo JSON-lines por tipo:
//!
//! ```text
//! dicionarios/
//! ├── gene.jsonl
//! ├── species.jsonl
//! └── lab_sample.jsonl
//! ```
//!
//! Cada linha é um [`DictionaryEntry`]. Arquivo ausente ou com linha
//! malformada torna o tipo **indisponível**: anotar com um dicionário
//! parcial esconderia entidades sem aviso.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::entity::EntityType;
use crate::error::{AnnotationError, Result};
use crate::tokenizer::normalize_str;

/// Uma entrada de dicionário.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryEntry {
    /// Identificador na base de origem (ex: "7157", "MESH:D001943").
    pub id: String,
    /// Base de origem (ex: "NCBI Gene", "MESH").
    pub id_type: String,
    /// Nome canônico.
    pub name: String,
    /// Sinônimo que gerou a chave (grafia original).
    pub synonym: String,
    /// Categoria taxonômica (apenas espécies).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Organismo ao qual a entrada pertence (genes e proteínas).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organism_id: Option<String>,
    /// Hyperlinks próprios; vazio usa o link padrão do `id_type`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hyperlinks: Vec<String>,
}

/// Acesso somente-leitura aos dicionários.
///
/// Implementações precisam ser seguras para leitura concorrente: os tipos
/// são consultados em paralelo.
pub trait EntityDictionary: Send + Sync {
    /// Falha se o dicionário do tipo não puder ser usado.
    fn ensure_available(&self, entity_type: EntityType) -> std::result::Result<(), AnnotationError>;

    /// Entradas para a chave normalizada; vazio quando não há correspondência.
    fn lookup(
        &self,
        entity_type: EntityType,
        key: &str,
    ) -> std::result::Result<Vec<DictionaryEntry>, AnnotationError>;

    /// Nome canônico de um id, se conhecido.
    fn primary_name(&self, entity_type: EntityType, id: &str) -> Option<String>;
}

#[derive(Debug, Default)]
struct TypeTable {
    by_key: HashMap<String, Vec<DictionaryEntry>>,
    names: HashMap<String, String>,
}

/// Dicionário em memória.
#[derive(Debug, Default)]
pub struct MemoryDictionary {
    tables: HashMap<EntityType, TypeTable>,
    /// Motivo da indisponibilidade de cada tipo que falhou ao carregar.
    unavailable: HashMap<EntityType, String>,
}

impl MemoryDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insere uma entrada; o tipo passa a ser disponível.
    pub fn insert(&mut self, entity_type: EntityType, entry: DictionaryEntry) {
        self.unavailable.remove(&entity_type);
        let table = self.tables.entry(entity_type).or_default();
        table
            .names
            .entry(entry.id.clone())
            .or_insert_with(|| entry.name.clone());
        table
            .by_key
            .entry(normalize_str(&entry.synonym))
            .or_default()
            .push(entry);
    }

    /// Registra um tipo vazio porém disponível.
    pub fn register_type(&mut self, entity_type: EntityType) {
        self.unavailable.remove(&entity_type);
        self.tables.entry(entity_type).or_default();
    }

    /// Carrega `<tipo>.jsonl` de cada tipo presente no diretório.
    ///
    /// Só falha se o próprio diretório não puder ser lido.
    pub fn open_dir(dir: &Path) -> Result<Self> {
        // diretório inexistente é erro de implantação, não de tipo
        if !dir.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} não é um diretório", dir.display()),
            )
            .into());
        }
        let mut dictionary = Self::new();
        for entity_type in EntityType::ALL {
            let path = dir.join(format!("{}.jsonl", entity_type.file_stem()));
            if !path.exists() {
                dictionary
                    .unavailable
                    .insert(entity_type, format!("{} não encontrado", path.display()));
                continue;
            }
            match load_jsonl(&path) {
                Ok(entries) => {
                    info!(entity_type = %entity_type, entries = entries.len(), "dicionário carregado");
                    dictionary.register_type(entity_type);
                    for entry in entries {
                        dictionary.insert(entity_type, entry);
                    }
                }
                Err(reason) => {
                    warn!(entity_type = %entity_type, %reason, "dicionário indisponível");
                    dictionary.unavailable.insert(entity_type, reason);
                }
            }
        }
        Ok(dictionary)
    }
}

fn load_jsonl(path: &Path) -> std::result::Result<Vec<DictionaryEntry>, String> {
    let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str::<DictionaryEntry>(line)
                .map_err(|e| format!("{}:{}: {}", path.display(), n + 1, e))
        })
        .collect()
}

impl EntityDictionary for MemoryDictionary {
    fn ensure_available(&self, entity_type: EntityType) -> std::result::Result<(), AnnotationError> {
        if self.tables.contains_key(&entity_type) {
            return Ok(());
        }
        let reason = self
            .unavailable
            .get(&entity_type)
            .cloned()
            .unwrap_or_else(|| "dicionário não carregado".to_string());
        Err(AnnotationError::dictionary_unavailable(entity_type, reason))
    }

    fn lookup(
        &self,
        entity_type: EntityType,
        key: &str,
    ) -> std::result::Result<Vec<DictionaryEntry>, AnnotationError> {
        self.ensure_available(entity_type)?;
        Ok(self
            .tables
            .get(&entity_type)
            .and_then(|t| t.by_key.get(key))
            .cloned()
            .unwrap_or_default())
    }

    fn primary_name(&self, entity_type: EntityType, id: &str) -> Option<String> {
        self.tables.get(&entity_type)?.names.get(id).cloned()
    }
}

#[cfg(test)]
pub(crate) fn entry(id: &str, id_type: &str, name: &str, synonym: &str) -> DictionaryEntry {
    DictionaryEntry {
        id: id.to_string(),
        id_type: id_type.to_string(),
        name: name.to_string(),
        synonym: synonym.to_string(),
        category: None,
        organism_id: None,
        hyperlinks: Vec::new(),
    }
}
