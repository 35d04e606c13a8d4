use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{IngestResult, row::Row};

/// What an upsert did to one row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// A storage session holding disease rows keyed by `mondo_id`.
#[async_trait::async_trait]
pub trait DataStoreAPI {
    /// Insert or update all rows as one atomic unit.
    ///
    /// Existing rows have every column overwritten except `created_at`.
    /// Outcomes are returned in the order of `rows`.
    async fn upsert_batch(&self, rows: &[Row]) -> IngestResult<Vec<UpsertOutcome>>;

    async fn get(&self, mondo_id: &str) -> IngestResult<Option<Row>>;

    async fn count(&self) -> IngestResult<usize>;

    /// Release the session. Called once at the end of the ingest stage.
    async fn shutdown(&self) -> IngestResult<()> {
        Ok(())
    }
}

pub type ArcDataStore = Arc<dyn DataStoreAPI + Send + Sync>;

/// Opens one storage session per pipeline run.
#[async_trait::async_trait]
pub trait DataStoreFactory {
    async fn connect(&self) -> IngestResult<ArcDataStore>;
}
