#![forbid(unsafe_code)]

use std::{sync::Arc, time::Duration};

use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use mondo_ingest_core::{
    IngestError, IngestResult,
    data_store::{ArcDataStore, DataStoreAPI, DataStoreFactory, UpsertOutcome},
    map::canonical_json,
    row::{COLUMNS, Row},
};
use tokio_postgres::NoTls;
use tracing::{debug, info};

use crate::{
    pg_error::PgStoreError,
    sql::{Expr, Select, StatementTimeout, Table, Upsert},
};

pub mod migrate;
mod pg_error;
mod sql;

pub use deadpool_postgres;
pub use tokio_postgres;

const TABLE: Table<'static> = Table {
    schema: "public",
    name: "mondo_diseases",
};

/// Columns stored as `jsonb` and exchanged as JSON text.
const JSON_COLUMNS: [&str; 3] = ["synonyms", "parent_ids", "source_json"];

/// Columns an upsert must never overwrite.
const WRITE_ONCE_COLUMNS: [&str; 2] = ["mondo_id", "created_at"];

pub struct PgDataStore {
    pool: Pool,
    upsert_sql: String,
    get_sql: String,
    count_sql: String,
    statement_timeout_sql: Option<String>,
}

impl PgDataStore {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            upsert_sql: upsert_sql(),
            get_sql: get_sql(),
            count_sql: count_sql(),
            statement_timeout_sql: None,
        }
    }

    /// Let the server cancel and roll back a batch statement running longer than `timeout`.
    pub fn with_statement_timeout(self, timeout: Option<Duration>) -> Self {
        Self {
            statement_timeout_sql: timeout.map(|timeout| StatementTimeout(timeout).to_string()),
            ..self
        }
    }
}

#[async_trait::async_trait]
impl DataStoreAPI for PgDataStore {
    async fn upsert_batch(&self, rows: &[Row]) -> IngestResult<Vec<UpsertOutcome>> {
        if rows.is_empty() {
            return Ok(vec![]);
        }

        let mut client = self.pool.get().await.map_err(PgStoreError::Pool)?;
        let txn = client.transaction().await.map_err(PgStoreError::Begin)?;
        if let Some(sql) = &self.statement_timeout_sql {
            txn.batch_execute(sql).await.map_err(PgStoreError::SetTimeout)?;
        }
        let stmt = txn
            .prepare_cached(&self.upsert_sql)
            .await
            .map_err(PgStoreError::Prepare)?;

        let mut outcomes = Vec::with_capacity(rows.len());

        for row in rows {
            let inserted: bool = txn
                .query_one(
                    &stmt,
                    &[
                        &row.mondo_id,
                        &row.disease_name,
                        &row.synonyms,
                        &row.parent_ids,
                        &row.definition,
                        &row.ontology_type,
                        &row.source_json,
                        &row.created_at,
                    ],
                )
                .await
                .map_err(|error| PgStoreError::Upsert(row.mondo_id.clone(), error))?
                .get(0);

            outcomes.push(if inserted {
                UpsertOutcome::Inserted
            } else {
                UpsertOutcome::Updated
            });
        }

        txn.commit().await.map_err(PgStoreError::Commit)?;
        debug!("committed {} rows", rows.len());

        Ok(outcomes)
    }

    async fn get(&self, mondo_id: &str) -> IngestResult<Option<Row>> {
        let client = self.pool.get().await.map_err(PgStoreError::Pool)?;
        let pg_row = client
            .query_opt(&self.get_sql, &[&mondo_id])
            .await
            .map_err(PgStoreError::Query)?;

        pg_row.map(|pg_row| decode_row(&pg_row)).transpose()
    }

    async fn count(&self) -> IngestResult<usize> {
        let client = self.pool.get().await.map_err(PgStoreError::Pool)?;
        let count: i64 = client
            .query_one(&self.count_sql, &[])
            .await
            .map_err(PgStoreError::Query)?
            .get(0);

        Ok(count as usize)
    }

    async fn shutdown(&self) -> IngestResult<()> {
        self.pool.close();
        Ok(())
    }
}

/// Connects to postgres and migrates the schema once per run.
#[derive(Clone)]
pub struct PgDataStoreFactory {
    pg_config: tokio_postgres::Config,
    pool_size: usize,
    statement_timeout: Option<Duration>,
}

impl PgDataStoreFactory {
    pub fn new(pg_config: tokio_postgres::Config) -> Self {
        Self {
            pg_config,
            pool_size: 2,
            statement_timeout: None,
        }
    }

    pub fn from_url(url: &str) -> IngestResult<Self> {
        let pg_config = url
            .parse::<tokio_postgres::Config>()
            .map_err(|error| IngestError::invalid_config(format!("postgres_url: {error}")))?;

        Ok(Self::new(pg_config))
    }

    pub fn with_pool_size(self, pool_size: usize) -> Self {
        Self { pool_size, ..self }
    }

    /// See [PgDataStore::with_statement_timeout].
    pub fn with_statement_timeout(self, statement_timeout: Option<Duration>) -> Self {
        Self {
            statement_timeout,
            ..self
        }
    }
}

#[async_trait::async_trait]
impl DataStoreFactory for PgDataStoreFactory {
    async fn connect(&self) -> IngestResult<ArcDataStore> {
        let manager = Manager::from_config(
            self.pg_config.clone(),
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(manager)
            .max_size(self.pool_size)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(PgStoreError::PoolBuild)?;

        {
            let mut client = pool.get().await.map_err(PgStoreError::Pool)?;
            migrate::migrate(&mut client)
                .await
                .map_err(PgStoreError::Migrate)?;
        }

        info!(
            "connected to database `{}`",
            self.pg_config.get_dbname().unwrap_or_default()
        );

        Ok(Arc::new(
            PgDataStore::new(pool).with_statement_timeout(self.statement_timeout),
        ))
    }
}

fn upsert_sql() -> String {
    let values = COLUMNS
        .iter()
        .enumerate()
        .map(|(index, column)| {
            if JSON_COLUMNS.contains(column) {
                Expr::Param(index).cast("text").cast("jsonb")
            } else {
                Expr::Param(index)
            }
        })
        .collect();

    let set = COLUMNS
        .iter()
        .filter(|column| !WRITE_ONCE_COLUMNS.contains(column))
        .map(|column| (*column, Expr::Excluded(column)))
        .chain([("updated_at", Expr::Now)])
        .collect();

    Upsert {
        into: TABLE,
        columns: &COLUMNS,
        values,
        key: "mondo_id",
        set,
        // xmax is zero for a freshly inserted tuple
        returning: Expr::Column("xmax").eq(Expr::Int(0)),
    }
    .to_string()
}

fn get_sql() -> String {
    Select {
        columns: COLUMNS
            .iter()
            .map(|column| {
                if JSON_COLUMNS.contains(column) {
                    Expr::Column(column).cast("text")
                } else {
                    Expr::Column(column)
                }
            })
            .collect(),
        from: TABLE,
        filter: Some(Expr::Column("mondo_id").eq(Expr::Param(0))),
    }
    .to_string()
}

fn count_sql() -> String {
    Select {
        columns: vec![Expr::CountAll],
        from: TABLE,
        filter: None,
    }
    .to_string()
}

fn decode_row(pg_row: &tokio_postgres::Row) -> IngestResult<Row> {
    let mondo_id: String = pg_row.get(0);
    let json = |index: usize| -> IngestResult<String> {
        let text: String = pg_row.get(index);
        let value = serde_json::from_str(&text)
            .map_err(|error| PgStoreError::CorruptJson(mondo_id.clone(), error.to_string()))?;
        canonical_json(&value)
    };

    Ok(Row {
        disease_name: pg_row.get(1),
        synonyms: json(2)?,
        parent_ids: json(3)?,
        definition: pg_row.get(4),
        ontology_type: pg_row.get(5),
        source_json: json(6)?,
        created_at: pg_row.get(7),
        mondo_id,
    })
}
