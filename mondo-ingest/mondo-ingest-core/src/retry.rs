use std::{future::Future, time::Duration};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{IngestError, IngestResult};

/// Exponential backoff around one external call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Upper bound for a single attempt. Elapsing counts as a transient failure.
    ///
    /// Only for calls that can be abandoned halfway, see [crate::ingest::Ingestor::with_retry].
    pub call_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
            call_timeout: None,
        }
    }
}

impl RetryPolicy {
    /// A policy that retries without waiting.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff_base: Duration::ZERO,
            backoff_max: Duration::ZERO,
            call_timeout: None,
        }
    }

    pub fn with_call_timeout(self, call_timeout: Option<Duration>) -> Self {
        Self {
            call_timeout,
            ..self
        }
    }

    /// Delay after the given failed attempt (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(20);
        self.backoff_base
            .saturating_mul(1 << shift)
            .min(self.backoff_max)
    }

    /// Run `call` until it succeeds, fails non-transiently, or runs out of attempts.
    ///
    /// An attempt that is already in flight is never interrupted by cancellation;
    /// cancellation and the run deadline are observed before each attempt and while
    /// waiting between attempts.
    pub async fn run<T, F, Fut>(&self, what: &str, guard: &RunGuard, mut call: F) -> IngestResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = IngestResult<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            guard.check()?;
            attempt += 1;

            let result = match self.call_timeout {
                Some(limit) => tokio::time::timeout(limit, call())
                    .await
                    .unwrap_or(Err(IngestError::CallTimeout(limit))),
                None => call().await,
            };

            match result {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() && attempt < max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        "{what} failed (attempt {attempt}/{max_attempts}), retrying in {delay:?}: {error}"
                    );
                    guard.pause(delay).await?;
                }
                Err(error) if error.is_transient() => {
                    return Err(IngestError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(error),
                    });
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// Cancellation and deadline of one pipeline run.
#[derive(Clone, Default)]
pub struct RunGuard {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl RunGuard {
    pub fn new(cancel: CancellationToken, deadline: Option<Instant>) -> Self {
        Self { cancel, deadline }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn check(&self) -> IngestResult<()> {
        if self.cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(IngestError::RunTimeout),
            _ => Ok(()),
        }
    }

    /// Wait for `delay`, unless cancelled or the deadline comes first.
    pub async fn pause(&self, delay: Duration) -> IngestResult<()> {
        let wake = Instant::now() + delay;
        let (wake, expires) = match self.deadline {
            Some(deadline) if deadline < wake => (deadline, true),
            _ => (wake, false),
        };

        tokio::select! {
            _ = self.cancel.cancelled() => Err(IngestError::Cancelled),
            _ = tokio::time::sleep_until(wake) => {
                if expires {
                    Err(IngestError::RunTimeout)
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Drive `future` to completion unless cancelled or the deadline passes.
    pub async fn interruptible<T>(
        &self,
        future: impl Future<Output = IngestResult<T>>,
    ) -> IngestResult<T> {
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = self.cancel.cancelled() => Err(IngestError::Cancelled),
            _ = deadline => Err(IngestError::RunTimeout),
            result = future => result,
        }
    }
}
