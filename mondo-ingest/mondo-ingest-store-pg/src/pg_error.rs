use deadpool_postgres::{BuildError, PoolError};
use mondo_ingest_core::IngestError;
use tokio_postgres::error::SqlState;
use tracing::{error, warn};

/// postgres errors, classified when converted into [IngestError]
#[derive(displaydoc::Display, Debug)]
pub enum PgStoreError {
    /// connection pool: {0}
    Pool(PoolError),
    /// connection pool setup: {0}
    PoolBuild(BuildError),
    /// migration: {0}
    Migrate(anyhow::Error),
    /// begin transaction: {0}
    Begin(tokio_postgres::Error),
    /// set statement timeout: {0}
    SetTimeout(tokio_postgres::Error),
    /// prepare statement: {0}
    Prepare(tokio_postgres::Error),
    /// upsert `{0}`: {1}
    Upsert(String, tokio_postgres::Error),
    /// commit: {0}
    Commit(tokio_postgres::Error),
    /// query: {0}
    Query(tokio_postgres::Error),
    /// stored value for `{0}` is not valid JSON: {1}
    CorruptJson(String, String),
}

impl From<PgStoreError> for IngestError {
    fn from(value: PgStoreError) -> Self {
        let transient = match &value {
            PgStoreError::Pool(PoolError::Backend(error)) => is_transient(error),
            PgStoreError::Pool(PoolError::Timeout(_)) => true,
            PgStoreError::Pool(_) | PgStoreError::PoolBuild(_) | PgStoreError::Migrate(_) => false,
            PgStoreError::Begin(error)
            | PgStoreError::SetTimeout(error)
            | PgStoreError::Prepare(error)
            | PgStoreError::Upsert(_, error)
            | PgStoreError::Commit(error)
            | PgStoreError::Query(error) => is_transient(error),
            PgStoreError::CorruptJson(..) => false,
        };

        if transient {
            warn!("pg transient error: {value:?}");
            IngestError::transient(format!("{value}"))
        } else {
            error!("pg error: {value:?}");
            IngestError::fatal(format!("{value}"))
        }
    }
}

const TRANSIENT_STATES: [SqlState; 8] = [
    SqlState::T_R_SERIALIZATION_FAILURE,
    SqlState::T_R_DEADLOCK_DETECTED,
    SqlState::LOCK_NOT_AVAILABLE,
    SqlState::ADMIN_SHUTDOWN,
    SqlState::CRASH_SHUTDOWN,
    SqlState::CANNOT_CONNECT_NOW,
    SqlState::TOO_MANY_CONNECTIONS,
    SqlState::QUERY_CANCELED,
];

fn is_transient(error: &tokio_postgres::Error) -> bool {
    if error.is_closed() {
        return true;
    }

    match error.code() {
        Some(code) => is_transient_state(code),
        // no SQLSTATE: the server was never reached or the socket failed
        None => std::error::Error::source(error)
            .is_some_and(|source| source.is::<std::io::Error>()),
    }
}

pub(crate) fn is_transient_state(code: &SqlState) -> bool {
    // class 08: connection exception
    TRANSIENT_STATES.contains(code) || code.code().starts_with("08")
}
