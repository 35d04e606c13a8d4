use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Column names of the target table, in storage order.
pub const COLUMNS: [&str; 8] = [
    "mondo_id",
    "disease_name",
    "synonyms",
    "parent_ids",
    "definition",
    "ontology_type",
    "source_json",
    "created_at",
];

/// A storage-ready row. Every column is always present; empty optional
/// values are `None` (SQL `NULL`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub mondo_id: String,
    pub disease_name: String,
    /// JSON array text.
    pub synonyms: String,
    /// JSON array text.
    pub parent_ids: String,
    pub definition: Option<String>,
    pub ontology_type: Option<String>,
    /// Canonical JSON text of the source object.
    pub source_json: String,
    pub created_at: DateTime<Utc>,
}

impl Row {
    /// Whether two rows carry the same data, ignoring `created_at`.
    pub fn same_content(&self, other: &Row) -> bool {
        self.mondo_id == other.mondo_id
            && self.disease_name == other.disease_name
            && self.synonyms == other.synonyms
            && self.parent_ids == other.parent_ids
            && self.definition == other.definition
            && self.ontology_type == other.ontology_type
            && self.source_json == other.source_json
    }

    pub fn decode_synonyms(&self) -> serde_json::Result<Vec<String>> {
        serde_json::from_str(&self.synonyms)
    }

    pub fn decode_parent_ids(&self) -> serde_json::Result<Vec<String>> {
        serde_json::from_str(&self.parent_ids)
    }

    pub fn decode_source_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.source_json)
    }
}
