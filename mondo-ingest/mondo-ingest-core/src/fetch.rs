use serde::{Deserialize, Serialize};

use crate::{IngestResult, raw_node::RawNode};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchedOntology {
    pub release_version: Option<String>,
    pub nodes: Vec<RawNode>,
}

/// A source of ontology nodes.
#[async_trait::async_trait]
pub trait Fetcher {
    /// Retrieve the complete node set of the current release.
    ///
    /// An empty node list is a valid result.
    async fn fetch(&self) -> IngestResult<FetchedOntology>;
}
