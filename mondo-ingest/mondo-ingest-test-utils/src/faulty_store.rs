use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use fnv::FnvHashMap;
use mondo_ingest_core::{
    IngestError, IngestResult,
    data_store::{ArcDataStore, DataStoreAPI, DataStoreFactory, UpsertOutcome},
    row::Row,
};
use tracing::debug;

/// A data store that fails on request and forwards everything else to `inner`.
///
/// Failures are scripted either per call (by zero-based call number) or per key
/// (every batch containing the key fails).
pub struct FaultyStore {
    inner: ArcDataStore,
    failing_calls: Mutex<FnvHashMap<usize, IngestError>>,
    failing_keys: Mutex<FnvHashMap<String, IngestError>>,
    calls: Mutex<Vec<Vec<String>>>,
    delay: Option<Duration>,
    shutdowns: AtomicUsize,
}

impl FaultyStore {
    pub fn new(inner: ArcDataStore) -> Self {
        Self {
            inner,
            failing_calls: Default::default(),
            failing_keys: Default::default(),
            calls: Default::default(),
            delay: None,
            shutdowns: AtomicUsize::new(0),
        }
    }

    /// Sleep this long inside every `upsert_batch` before touching `inner`.
    pub fn with_delay(self, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..self
        }
    }

    pub fn fail_call(self, call: usize, error: IngestError) -> Self {
        self.failing_calls.lock().unwrap().insert(call, error);
        self
    }

    pub fn fail_key(self, mondo_id: &str, error: IngestError) -> Self {
        self.failing_keys
            .lock()
            .unwrap()
            .insert(mondo_id.to_string(), error);
        self
    }

    /// The keys of every `upsert_batch` call, failed or not.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    fn scripted_failure(&self, call: usize, rows: &[Row]) -> Option<IngestError> {
        if let Some(error) = self.failing_calls.lock().unwrap().remove(&call) {
            return Some(error);
        }

        let failing_keys = self.failing_keys.lock().unwrap();
        rows.iter()
            .find_map(|row| failing_keys.get(&row.mondo_id).cloned())
    }
}

#[async_trait::async_trait]
impl DataStoreAPI for FaultyStore {
    async fn upsert_batch(&self, rows: &[Row]) -> IngestResult<Vec<UpsertOutcome>> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(rows.iter().map(|row| row.mondo_id.clone()).collect());
            calls.len() - 1
        };

        if let Some(error) = self.scripted_failure(call, rows) {
            debug!("call {call} fails: {error}");
            return Err(error);
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.inner.upsert_batch(rows).await
    }

    async fn get(&self, mondo_id: &str) -> IngestResult<Option<Row>> {
        self.inner.get(mondo_id).await
    }

    async fn count(&self) -> IngestResult<usize> {
        self.inner.count().await
    }

    async fn shutdown(&self) -> IngestResult<()> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        self.inner.shutdown().await
    }
}

/// Hands out one shared store, after failing the first connection attempts as scripted.
pub struct TestStoreFactory {
    store: ArcDataStore,
    connect_failures: Mutex<VecDeque<IngestError>>,
    connects: AtomicUsize,
}

impl TestStoreFactory {
    pub fn new(store: ArcDataStore) -> Self {
        Self {
            store,
            connect_failures: Default::default(),
            connects: AtomicUsize::new(0),
        }
    }

    pub fn fail_connect(self, error: IngestError) -> Self {
        self.connect_failures.lock().unwrap().push_back(error);
        self
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl From<Arc<FaultyStore>> for TestStoreFactory {
    fn from(store: Arc<FaultyStore>) -> Self {
        Self::new(store)
    }
}

#[async_trait::async_trait]
impl DataStoreFactory for TestStoreFactory {
    async fn connect(&self) -> IngestResult<ArcDataStore> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        match self.connect_failures.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(self.store.clone()),
        }
    }
}
