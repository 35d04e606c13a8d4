use chrono::{DateTime, Utc};
use mondo_ingest_core::{
    config::PipelineConfig, map::Mapper, normalize::normalize, row::Row, subset::SubsetPolicy,
};
use mondo_ingest_test_utils::{nodes, system::frozen_system};

mod test_ingest;
mod test_normalize_map;
mod test_runner;

/// Default configuration without retry delays.
fn config() -> PipelineConfig {
    PipelineConfig {
        retry_backoff_base_ms: 0,
        retry_backoff_max_ms: 0,
        ..Default::default()
    }
}

/// `count` mapped rows stamped with `time`.
fn rows(count: usize, time: DateTime<Utc>) -> Vec<Row> {
    let normalized = normalize(nodes::numbered(count), false, &SubsetPolicy::default());
    let system = frozen_system(time);

    Mapper::new(system.as_ref()).map(&normalized.records).rows
}

fn key(n: usize) -> String {
    format!("MONDO:{n:07}")
}
