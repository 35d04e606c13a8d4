#![forbid(unsafe_code)]

pub mod faulty_store;
pub mod static_fetcher;

pub use unimock;

pub mod system {
    use std::sync::Arc;

    use chrono::{DateTime, TimeZone, Utc};
    use mondo_ingest_core::system::{ArcSystemApi, SystemApiMock};
    use ulid::Ulid;
    use unimock::*;

    /// Noon, January 1st 2024.
    pub fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    pub fn fixed_run_id() -> Ulid {
        Ulid::from_parts(fixed_time().timestamp_millis() as u64, 42)
    }

    /// Mock [mondo_ingest_core::system::SystemAPI::current_time] to always return `time`.
    pub fn mock_current_time(time: DateTime<Utc>) -> impl unimock::Clause {
        SystemApiMock::current_time
            .each_call(matching!())
            .returns(time)
    }

    pub fn mock_run_id(run_id: Ulid) -> impl unimock::Clause {
        SystemApiMock::generate_run_id
            .each_call(matching!())
            .returns(run_id)
    }

    /// A system whose clock stands still at `time`.
    pub fn frozen_system(time: DateTime<Utc>) -> ArcSystemApi {
        Arc::new(Unimock::new((
            mock_current_time(time),
            mock_run_id(fixed_run_id()),
        ))
        .no_verify_in_drop())
    }
}

pub mod nodes {
    use mondo_ingest_core::raw_node::RawNode;
    use serde_json::json;

    /// A node carrying the OBO-Graphs object it would have been parsed from.
    pub fn node(id: &str, label: &str) -> RawNode {
        RawNode::new(id)
            .with_label(label)
            .with_raw(json!({ "id": id, "lbl": label, "type": "CLASS" }))
    }

    /// `count` distinct nodes `MONDO:0000001`, `MONDO:0000002`, ...
    pub fn numbered(count: usize) -> Vec<RawNode> {
        (1..=count)
            .map(|n| node(&format!("MONDO:{n:07}"), &format!("disease {n}")))
            .collect()
    }

    pub fn neoplasm(id: &str, label: &str) -> RawNode {
        node(id, label).with_subsets(["http://purl.obolibrary.org/obo/mondo#neoplasm"])
    }
}
