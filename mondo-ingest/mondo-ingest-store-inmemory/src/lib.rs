#![forbid(unsafe_code)]

use std::sync::Arc;

use fnv::FnvHashSet;
use indexmap::IndexMap;
use mondo_ingest_core::{
    IngestError, IngestResult,
    data_store::{ArcDataStore, DataStoreAPI, DataStoreFactory, UpsertOutcome},
    row::Row,
};
use tokio::sync::RwLock;
use tracing::debug;

/// Rows kept in insertion order, keyed by `mondo_id`.
#[derive(Default)]
pub struct InMemoryDb {
    rows: RwLock<IndexMap<String, Row>>,
}

impl InMemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// All rows in first-insert order.
    pub async fn rows(&self) -> Vec<Row> {
        self.rows.read().await.values().cloned().collect()
    }
}

#[async_trait::async_trait]
impl DataStoreAPI for InMemoryDb {
    async fn upsert_batch(&self, rows: &[Row]) -> IngestResult<Vec<UpsertOutcome>> {
        validate_batch(rows)?;

        let mut table = self.rows.write().await;
        let outcomes = rows
            .iter()
            .map(|row| match table.get_mut(&row.mondo_id) {
                Some(existing) => {
                    let created_at = existing.created_at;
                    *existing = Row {
                        created_at,
                        ..row.clone()
                    };
                    UpsertOutcome::Updated
                }
                None => {
                    table.insert(row.mondo_id.clone(), row.clone());
                    UpsertOutcome::Inserted
                }
            })
            .collect();

        debug!("upserted {} rows, table has {}", rows.len(), table.len());

        Ok(outcomes)
    }

    async fn get(&self, mondo_id: &str) -> IngestResult<Option<Row>> {
        Ok(self.rows.read().await.get(mondo_id).cloned())
    }

    async fn count(&self) -> IngestResult<usize> {
        Ok(self.rows.read().await.len())
    }
}

/// Reject the whole batch before touching the table.
fn validate_batch(rows: &[Row]) -> IngestResult<()> {
    let mut seen: FnvHashSet<&str> = Default::default();

    for row in rows {
        if row.mondo_id.trim().is_empty() {
            return Err(IngestError::fatal("row without mondo_id"));
        }
        if !seen.insert(row.mondo_id.as_str()) {
            return Err(IngestError::fatal(format!(
                "duplicate key `{}` within one batch",
                row.mondo_id
            )));
        }
    }

    Ok(())
}

/// Hands out the same database to every run, so state survives between runs.
#[derive(Clone, Default)]
pub struct InMemoryDataStoreFactory {
    db: Arc<InMemoryDb>,
}

impl InMemoryDataStoreFactory {
    pub fn db(&self) -> &Arc<InMemoryDb> {
        &self.db
    }
}

#[async_trait::async_trait]
impl DataStoreFactory for InMemoryDataStoreFactory {
    async fn connect(&self) -> IngestResult<ArcDataStore> {
        Ok(self.db.clone())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    use super::*;

    fn row(mondo_id: &str, disease_name: &str, day: u32) -> Row {
        Row {
            mondo_id: mondo_id.to_string(),
            disease_name: disease_name.to_string(),
            synonyms: "[]".to_string(),
            parent_ids: "[]".to_string(),
            definition: None,
            ontology_type: None,
            source_json: "{}".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn update_keeps_created_at() {
        let db = InMemoryDb::new();

        assert_eq!(
            db.upsert_batch(&[row("M:1", "old", 1)]).await.unwrap(),
            vec![UpsertOutcome::Inserted]
        );
        assert_eq!(
            db.upsert_batch(&[row("M:1", "new", 2), row("M:2", "other", 2)])
                .await
                .unwrap(),
            vec![UpsertOutcome::Updated, UpsertOutcome::Inserted]
        );

        let stored = db.get("M:1").await.unwrap().unwrap();
        assert_eq!(stored.disease_name, "new");
        assert_eq!(stored.created_at, row("M:1", "", 1).created_at);
        assert_eq!(db.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn rejected_batch_leaves_no_trace() {
        let db = InMemoryDb::new();
        let error = db
            .upsert_batch(&[row("M:1", "a", 1), row("M:2", "b", 1), row("M:1", "c", 1)])
            .await
            .unwrap_err();

        assert_eq!(
            error,
            IngestError::fatal("duplicate key `M:1` within one batch")
        );
        assert_eq!(db.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn blank_key_is_fatal() {
        let db = InMemoryDb::new();
        assert!(matches!(
            db.upsert_batch(&[row(" ", "a", 1)]).await,
            Err(IngestError::Fatal(_))
        ));
    }

    #[tokio::test]
    async fn factory_shares_state() {
        let factory = InMemoryDataStoreFactory::default();
        factory
            .connect()
            .await
            .unwrap()
            .upsert_batch(&[row("M:1", "a", 1)])
            .await
            .unwrap();

        assert_eq!(factory.connect().await.unwrap().count().await.unwrap(), 1);
        assert_eq!(factory.db().rows().await.len(), 1);
    }
}
