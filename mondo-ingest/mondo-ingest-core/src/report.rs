use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::normalize::NormalizeStats;

/// A record that was skipped, and why.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordIssue {
    pub id: Option<String>,
    pub reason: String,
}

impl RecordIssue {
    pub fn new(id: Option<String>, reason: impl Into<String>) -> Self {
        Self {
            id,
            reason: reason.into(),
        }
    }
}

/// A row that belonged to a failed batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFailure {
    pub mondo_id: String,
    /// Zero-based batch index.
    pub batch: usize,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Rows sent to storage, whether they succeeded or not.
    pub attempted: usize,
    pub inserted: usize,
    pub updated: usize,
    /// Rows beyond the trial limit.
    pub skipped_trial: usize,
    /// Rows in batches that failed.
    pub failed: usize,
    /// Rows never sent because the ingest halted (error policy or cancellation).
    pub skipped_halted: usize,
    pub failures: Vec<RowFailure>,
    pub halted_keys: Vec<String>,
}

impl IngestReport {
    pub fn failed_keys(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|failure| failure.mondo_id.as_str())
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.skipped_halted == 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Normalize,
    Map,
    Ingest,
}

impl Stage {
    pub fn next(self) -> Option<Stage> {
        match self {
            Self::Fetch => Some(Self::Normalize),
            Self::Normalize => Some(Self::Map),
            Self::Map => Some(Self::Ingest),
            Self::Ingest => None,
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fetch => write!(f, "fetch"),
            Self::Normalize => write!(f, "normalize"),
            Self::Map => write!(f, "map"),
            Self::Ingest => write!(f, "ingest"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Succeeded,
    Failed,
    /// Not reached, because the run stopped earlier.
    Skipped,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    pub status: StageStatus,
    pub input: usize,
    pub output: usize,
    pub errors: Vec<String>,
}

impl StageReport {
    /// A stage that ran. It failed if there are any errors.
    pub fn new(stage: Stage, input: usize, output: usize, errors: Vec<String>) -> Self {
        Self {
            stage,
            status: if errors.is_empty() {
                StageStatus::Succeeded
            } else {
                StageStatus::Failed
            },
            input,
            output,
            errors,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == StageStatus::Failed
    }

    pub fn skipped(stage: Stage) -> Self {
        Self {
            stage,
            status: StageStatus::Skipped,
            input: 0,
            output: 0,
            errors: vec![],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RunOutcome {
    Succeeded,
    /// Some stage failed, but the error policy let the run continue.
    CompletedWithErrors,
    Failed { stage: Stage, reason: String },
}

/// Everything that happened during one pipeline run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Ulid,
    pub release_version: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: RunOutcome,
    pub stages: Vec<StageReport>,
    pub normalize: NormalizeStats,
    /// Records dropped by the runner's early trial truncation.
    pub skipped_trial: usize,
    pub ingest: IngestReport,
    /// Records skipped before ingestion, with reasons.
    pub issues: Vec<RecordIssue>,
}

impl RunSummary {
    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|report| report.stage == stage)
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, RunOutcome::Succeeded)
    }

    /// Trial-skipped records across the runner and the ingestor.
    pub fn total_skipped_trial(&self) -> usize {
        self.skipped_trial + self.ingest.skipped_trial
    }
}
