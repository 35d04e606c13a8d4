use std::sync::Arc;

use chrono::Utc;

/// System-specific functionality used by the pipeline.
#[cfg_attr(feature = "unimock", unimock::unimock(api = SystemApiMock))]
pub trait SystemAPI {
    /// Get the system's current time.
    fn current_time(&self) -> chrono::DateTime<chrono::Utc>;

    /// Generate an id for a new pipeline run.
    fn generate_run_id(&self) -> ulid::Ulid {
        ulid::Ulid::new()
    }
}

/// A [SystemAPI] in an [Arc].
pub type ArcSystemApi = Arc<dyn SystemAPI + Send + Sync>;

/// The wall clock.
#[derive(Clone, Copy, Default)]
pub struct System;

impl SystemAPI for System {
    fn current_time(&self) -> chrono::DateTime<chrono::Utc> {
        current_time()
    }
}

pub fn current_time() -> chrono::DateTime<chrono::Utc> {
    Utc::now()
}
