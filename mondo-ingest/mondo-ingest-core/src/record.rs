use std::fmt::Display;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Classification derived from a term's subset tags.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OntologyType {
    Neoplastic,
    Rare,
    /// Alphabetically first subset when no marker matched.
    Subset(String),
    /// No subsets at all.
    Unclassified,
}

impl OntologyType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Neoplastic => "neoplastic",
            Self::Rare => "rare",
            Self::Subset(subset) => subset,
            Self::Unclassified => "",
        }
    }

    pub fn is_oncology_relevant(&self) -> bool {
        matches!(self, Self::Neoplastic)
    }
}

impl Display for OntologyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A deduplicated, flattened ontology term.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub mondo_id: String,
    pub disease_name: String,
    pub synonyms: Vec<String>,
    pub parent_ids: IndexSet<String>,
    pub definition: String,
    pub ontology_type: OntologyType,
    pub source_json: serde_json::Value,
    /// Parents not present in the normalized batch. Diagnostic only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unresolved_parents: Vec<String>,
    /// The term lists itself as a parent. Diagnostic only.
    #[serde(default)]
    pub self_reference: bool,
}
