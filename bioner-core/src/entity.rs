//! # Tipos de Entidade Biomédica
//!
//! Define o vocabulário semântico do anotador: cada anotação carrega
//! exatamente um [`EntityType`].
//!
//! ## Tipos suportados
//!
//! | Tipo        | Dicionário típico     | Depende de organismo? |
//! |-------------|-----------------------|-----------------------|
//! | Gene        | NCBI Gene             | sim                   |
//! | Protein     | UniProt               | sim                   |
//! | Species     | NCBI Taxonomy         | não                   |
//! | Chemical    | ChEBI                 | não                   |
//! | Compound    | BioCyc                | não                   |
//! | Disease     | MeSH                  | não                   |
//! | Anatomy     | MeSH                  | não                   |
//! | Phenotype   | MeSH                  | não                   |
//! | Phenomena   | MeSH                  | não                   |
//! | Food        | MeSH                  | não                   |
//! | Company, Entity, Lab Sample, Lab Strain | termos do usuário | não |
//!
//! ## Links
//!
//! Cada anotação leva links de busca ([`search_links`]) montados a partir do
//! texto, e hyperlinks para o registro de origem ([`id_hyperlink`]) montados
//! a partir do par `(id_type, id)`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Taxonomia NCBI de *Homo sapiens*.
pub const HOMO_SAPIENS_TAX_ID: &str = "9606";

/// Categoria de organismo quando o dicionário de espécies não informa nenhuma.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Categoria taxonômica dos vírus (contam como ocorrência humana).
pub const VIRUSES: &str = "Viruses";

/// Tipos de entidade reconhecidos.
///
/// A ordem de declaração é usada como último critério de desempate na fusão
/// de intervalos, depois de comprimento e precedência.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityType {
    Anatomy,
    Chemical,
    Compound,
    Disease,
    Food,
    Gene,
    Phenomena,
    Phenotype,
    Protein,
    Species,
    Company,
    Entity,
    #[serde(rename = "Lab Sample")]
    LabSample,
    #[serde(rename = "Lab Strain")]
    LabStrain,
}

impl EntityType {
    /// Todos os tipos, em ordem de declaração.
    pub const ALL: [EntityType; 14] = [
        EntityType::Anatomy,
        EntityType::Chemical,
        EntityType::Compound,
        EntityType::Disease,
        EntityType::Food,
        EntityType::Gene,
        EntityType::Phenomena,
        EntityType::Phenotype,
        EntityType::Protein,
        EntityType::Species,
        EntityType::Company,
        EntityType::Entity,
        EntityType::LabSample,
        EntityType::LabStrain,
    ];

    /// Nome no formato externo (ex: "Lab Sample").
    pub fn name(&self) -> &'static str {
        match self {
            EntityType::Anatomy => "Anatomy",
            EntityType::Chemical => "Chemical",
            EntityType::Compound => "Compound",
            EntityType::Disease => "Disease",
            EntityType::Food => "Food",
            EntityType::Gene => "Gene",
            EntityType::Phenomena => "Phenomena",
            EntityType::Phenotype => "Phenotype",
            EntityType::Protein => "Protein",
            EntityType::Species => "Species",
            EntityType::Company => "Company",
            EntityType::Entity => "Entity",
            EntityType::LabSample => "Lab Sample",
            EntityType::LabStrain => "Lab Strain",
        }
    }

    /// Nome de arquivo do dicionário deste tipo (ex: `lab_sample`).
    pub fn file_stem(&self) -> String {
        self.name().to_lowercase().replace(' ', "_")
    }

    /// Tenta interpretar o nome externo (ex: "Gene" → `Some(Gene)`).
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.name() == s)
    }

    /// Genes e proteínas mapeiam o mesmo símbolo para ids diferentes por espécie.
    pub fn is_organism_dependent(&self) -> bool {
        matches!(self, EntityType::Gene | EntityType::Protein)
    }

    /// Precedência padrão usada quando dois candidatos têm o mesmo comprimento.
    /// Maior vence; tipos de laboratório não têm precedência própria.
    pub fn default_precedence(&self) -> u32 {
        match self {
            EntityType::Species => 12,
            EntityType::Gene => 11,
            EntityType::Protein => 10,
            EntityType::Phenotype => 9,
            EntityType::Phenomena => 8,
            EntityType::Chemical => 7,
            EntityType::Compound => 6,
            EntityType::Disease => 5,
            EntityType::Anatomy => 4,
            EntityType::Food => 3,
            EntityType::Company => 2,
            EntityType::Entity => 1,
            EntityType::LabSample | EntityType::LabStrain => 0,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Links de busca anexados a toda anotação.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Links {
    #[serde(default)]
    pub ncbi: String,
    #[serde(default)]
    pub uniprot: String,
    #[serde(default)]
    pub mesh: String,
    #[serde(default)]
    pub chebi: String,
    #[serde(default)]
    pub pubchem: String,
    #[serde(default)]
    pub wikipedia: String,
    #[serde(default)]
    pub google: String,
}

const NCBI_SEARCH: &str = "https://www.ncbi.nlm.nih.gov/gene/?term=";
const UNIPROT_SEARCH: &str = "https://www.uniprot.org/uniprot/?sort=score&query=";
const MESH_SEARCH: &str = "https://www.ncbi.nlm.nih.gov/mesh/?term=";
const CHEBI_SEARCH: &str = "https://www.ebi.ac.uk/chebi/advancedSearchFT.do?searchString=";
const PUBCHEM_SEARCH: &str = "https://pubchem.ncbi.nlm.nih.gov/#query=";
const WIKIPEDIA_SEARCH: &str = "https://www.google.com/search?q=site:+wikipedia.org+";
const GOOGLE_SEARCH: &str = "https://www.google.com/search?q=";

/// Monta os links de busca para um termo.
pub fn search_links(keyword: &str) -> Links {
    Links {
        ncbi: format!("{NCBI_SEARCH}{keyword}"),
        uniprot: format!("{UNIPROT_SEARCH}{keyword}"),
        mesh: format!("{MESH_SEARCH}{keyword}"),
        chebi: format!("{CHEBI_SEARCH}{keyword}"),
        pubchem: format!("{PUBCHEM_SEARCH}{keyword}"),
        wikipedia: format!("{WIKIPEDIA_SEARCH}{keyword}"),
        google: format!("{GOOGLE_SEARCH}{keyword}"),
    }
}

/// Hyperlink para o registro de origem, ou `None` para bases desconhecidas.
///
/// Ids MeSH chegam como `MESH:D000001`; o prefixo é removido.
pub fn id_hyperlink(id_type: &str, id: &str) -> Option<String> {
    let base = match id_type {
        "CHEBI" => "https://www.ebi.ac.uk/chebi/searchId.do?chebiId=",
        "MESH" => "https://www.ncbi.nlm.nih.gov/mesh/",
        "UNIPROT" => UNIPROT_SEARCH,
        "NCBI Gene" => "https://www.ncbi.nlm.nih.gov/gene/",
        "NCBI Taxonomy" => "https://www.ncbi.nlm.nih.gov/Taxonomy/Browser/wwwtax.cgi?id=",
        "BIOCYC" => "https://biocyc.org/compound?orgid=META&id=",
        "CUSTOM" => GOOGLE_SEARCH,
        _ => return None,
    };
    let id = if id_type == "MESH" {
        id.strip_prefix("MESH:").unwrap_or(id)
    } else {
        id
    };
    Some(format!("{base}{id}"))
}

/// Palavras comuns que nunca viram anotação sozinhas.
pub const COMMON_WORDS: &[&str] = &[
    // duas letras
    "of", "to", "in", "it", "is", "be", "as", "at", "so", "we", "he", "by", "or",
    "on", "do", "if", "me", "my", "up", "an", "go", "no", "us", "am", "et", "vs",
    // três letras
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had",
    "her", "was", "one", "our", "out", "day", "get", "has", "him", "his", "how",
    "man", "new", "now", "old", "see", "two", "way", "who", "boy", "did", "its",
    "let", "put", "say", "she", "too", "use", "end", "min", "far", "set", "key",
    "tag", "pdf", "raw", "low", "med", "men", "led", "add",
    // quatro letras
    "that", "with", "have", "this", "will", "your", "from", "name", "they", "know",
    "want", "been", "good", "much", "some", "time", "none", "link", "bond", "acid",
    "role", "them", "even", "same",
    // substantivos genéricos de biologia
    "patch", "membrane", "walker", "group", "cluster", "protein", "transporter",
    "toxin", "molecule", "vitamin", "light", "mixture", "solution", "other",
    "unknown", "damage",
];
