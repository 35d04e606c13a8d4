use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    IngestError, IngestResult, normalize::NormalizeOptions, retry::RetryPolicy,
    subset::SubsetPolicy,
};

/// Settings of one pipeline run.
///
/// Every field has a default, unknown keys are rejected when deserializing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Abort the run at the first failed stage.
    pub stop_on_error: bool,
    /// Maximum number of records to persist. 0 means unlimited.
    pub trial_limit: usize,
    pub filter_oncology_only: bool,
    /// Leave out veterinary terms.
    pub human_only: bool,
    /// Terms never to ingest, by id.
    pub exclude_ids: Vec<String>,
    /// Only ingest terms changed at or after this instant.
    pub updated_since: Option<DateTime<Utc>>,
    /// Treat skipped malformed records as a failure of the normalize stage.
    pub strict_input: bool,
    pub batch_size: usize,
    pub retry_max_attempts: u32,
    pub retry_backoff_base_ms: u64,
    pub retry_backoff_max_ms: u64,
    pub call_timeout_ms: Option<u64>,
    pub run_timeout_ms: Option<u64>,
    pub subsets: SubsetPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stop_on_error: true,
            trial_limit: 0,
            filter_oncology_only: false,
            human_only: true,
            exclude_ids: vec![],
            updated_since: None,
            strict_input: false,
            batch_size: 500,
            retry_max_attempts: 3,
            retry_backoff_base_ms: 1000,
            retry_backoff_max_ms: 30_000,
            call_timeout_ms: None,
            run_timeout_ms: None,
            subsets: SubsetPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> IngestResult<()> {
        if self.batch_size == 0 {
            return Err(IngestError::invalid_config("batch_size must be positive"));
        }
        if self.retry_max_attempts == 0 {
            return Err(IngestError::invalid_config(
                "retry_max_attempts must be at least 1",
            ));
        }
        if self.retry_backoff_max_ms < self.retry_backoff_base_ms {
            return Err(IngestError::invalid_config(
                "retry_backoff_max_ms must not be less than retry_backoff_base_ms",
            ));
        }
        if self.call_timeout_ms == Some(0) {
            return Err(IngestError::invalid_config("call_timeout_ms must be positive"));
        }
        if self.run_timeout_ms == Some(0) {
            return Err(IngestError::invalid_config("run_timeout_ms must be positive"));
        }
        if self.filter_oncology_only && self.subsets.oncology_markers.is_empty() {
            return Err(IngestError::invalid_config(
                "filter_oncology_only requires at least one oncology marker",
            ));
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            backoff_base: Duration::from_millis(self.retry_backoff_base_ms),
            backoff_max: Duration::from_millis(self.retry_backoff_max_ms),
            call_timeout: self.call_timeout_ms.map(Duration::from_millis),
        }
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_ms.map(Duration::from_millis)
    }

    pub fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            filter_oncology_only: self.filter_oncology_only,
            human_only: self.human_only,
            exclude_ids: self.exclude_ids.clone(),
            updated_since: self.updated_since,
            subsets: self.subsets.clone(),
        }
    }

    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            batch_size: self.batch_size,
            trial_limit: self.trial_limit,
            stop_on_error: self.stop_on_error,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IngestOptions {
    pub batch_size: usize,
    /// 0 means unlimited.
    pub trial_limit: usize,
    pub stop_on_error: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        PipelineConfig::default().ingest_options()
    }
}
