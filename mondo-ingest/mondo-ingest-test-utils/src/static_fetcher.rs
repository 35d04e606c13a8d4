use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use mondo_ingest_core::{
    IngestError, IngestResult,
    fetch::{FetchedOntology, Fetcher},
    raw_node::RawNode,
};

/// Returns the same nodes on every call, after the scripted failures are used up.
pub struct StaticFetcher {
    fetched: FetchedOntology,
    failures: Mutex<VecDeque<IngestError>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StaticFetcher {
    pub fn new(nodes: Vec<RawNode>) -> Self {
        Self {
            fetched: FetchedOntology {
                release_version: Some("test-release".to_string()),
                nodes,
            },
            failures: Default::default(),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_first(self, error: IngestError) -> Self {
        self.failures.lock().unwrap().push_back(error);
        self
    }

    /// Sleep before answering.
    pub fn with_delay(self, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..self
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self) -> IngestResult<FetchedOntology> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.failures.lock().unwrap().pop_front();
        match failure {
            Some(error) => Err(error),
            None => Ok(self.fetched.clone()),
        }
    }
}
