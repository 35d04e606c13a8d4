use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// One ontology term as handed over by a [crate::fetch::Fetcher].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawNode {
    /// The natural key. `None` (or blank) makes the node malformed.
    pub id: Option<String>,
    pub label: String,
    pub synonyms: Vec<String>,
    pub parents: IndexSet<String>,
    pub definition: Option<String>,
    pub subsets: IndexSet<String>,
    /// Cross-references such as `OMIM:219700`.
    #[serde(default)]
    pub xrefs: Vec<String>,
    /// NCBI taxa the term is restricted to.
    #[serde(default)]
    pub taxa: Vec<String>,
    /// When the term was last changed upstream, if known.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Why the source object could not be read. Such nodes are reported, never stored.
    #[serde(default)]
    pub unreadable: Option<String>,
    /// The source object this node was read from, kept verbatim.
    pub raw: serde_json::Value,
}

impl RawNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            label: String::new(),
            synonyms: vec![],
            parents: IndexSet::new(),
            definition: None,
            subsets: IndexSet::new(),
            xrefs: vec![],
            taxa: vec![],
            updated_at: None,
            unreadable: None,
            raw: serde_json::Value::Null,
        }
    }

    pub fn with_label(self, label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..self
        }
    }

    pub fn with_synonyms<S: Into<String>>(self, synonyms: impl IntoIterator<Item = S>) -> Self {
        Self {
            synonyms: synonyms.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    pub fn with_parents<S: Into<String>>(self, parents: impl IntoIterator<Item = S>) -> Self {
        Self {
            parents: parents.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    pub fn with_definition(self, definition: impl Into<String>) -> Self {
        Self {
            definition: Some(definition.into()),
            ..self
        }
    }

    pub fn with_subsets<S: Into<String>>(self, subsets: impl IntoIterator<Item = S>) -> Self {
        Self {
            subsets: subsets.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    pub fn with_xrefs<S: Into<String>>(self, xrefs: impl IntoIterator<Item = S>) -> Self {
        Self {
            xrefs: xrefs.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    pub fn with_taxa<S: Into<String>>(self, taxa: impl IntoIterator<Item = S>) -> Self {
        Self {
            taxa: taxa.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    pub fn with_updated_at(self, updated_at: DateTime<Utc>) -> Self {
        Self {
            updated_at: Some(updated_at),
            ..self
        }
    }

    pub fn with_raw(self, raw: serde_json::Value) -> Self {
        Self { raw, ..self }
    }

    /// The id, if present and not blank.
    pub fn id(&self) -> Option<&str> {
        self.id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}
