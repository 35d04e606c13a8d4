use std::time::Duration;

use thiserror::Error;

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum IngestError {
    /// A record that cannot be used, e.g. missing its id.
    #[error("malformed input: {0}")]
    Malformed(String),
    /// A failure that may go away when the call is repeated.
    #[error("transient failure: {0}")]
    Transient(String),
    /// Authentication, schema or constraint problems. Never retried.
    #[error("fatal failure: {0}")]
    Fatal(String),
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<IngestError> },
    #[error("call timed out after {0:?}")]
    CallTimeout(Duration),
    #[error("run deadline exceeded")]
    RunTimeout,
    #[error("cancelled")]
    Cancelled,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type IngestResult<T> = Result<T, IngestError>;

impl IngestError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Whether repeating the failed call could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::CallTimeout(_))
    }

    /// Whether the whole run has to stop, regardless of error policy.
    pub fn is_run_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::RunTimeout)
    }
}
