use std::{sync::Arc, time::Duration};

use mondo_ingest_core::{
    IngestError,
    config::PipelineConfig,
    data_store::{DataStoreAPI, DataStoreFactory},
    fetch::Fetcher,
    raw_node::RawNode,
    report::{RunOutcome, RunSummary, Stage, StageReport, StageStatus},
    runner::PipelineRunner,
};
use mondo_ingest_store_inmemory::{InMemoryDataStoreFactory, InMemoryDb};
use mondo_ingest_test_utils::{
    faulty_store::{FaultyStore, TestStoreFactory},
    nodes::{self, node},
    static_fetcher::StaticFetcher,
    system::{fixed_run_id, fixed_time, frozen_system},
};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use crate::{config, key};

async fn run(
    config: PipelineConfig,
    fetcher: Arc<dyn Fetcher + Send + Sync>,
    store_factory: Arc<dyn DataStoreFactory + Send + Sync>,
) -> RunSummary {
    PipelineRunner::new(config, frozen_system(fixed_time()), fetcher, store_factory)
        .unwrap()
        .run()
        .await
}

fn statuses(summary: &RunSummary) -> Vec<(Stage, StageStatus)> {
    summary
        .stages
        .iter()
        .map(|report| (report.stage, report.status))
        .collect()
}

#[tokio::test]
async fn successful_run() {
    let factory = InMemoryDataStoreFactory::default();
    let summary = run(
        config(),
        Arc::new(StaticFetcher::new(nodes::numbered(3))),
        Arc::new(factory.clone()),
    )
    .await;

    assert_eq!(summary.outcome, RunOutcome::Succeeded);
    assert_eq!(summary.run_id, fixed_run_id());
    assert_eq!(summary.release_version.as_deref(), Some("test-release"));
    assert_eq!(summary.started_at, fixed_time());
    assert_eq!(summary.finished_at, fixed_time());
    assert_eq!(
        summary.stages,
        vec![
            StageReport::new(Stage::Fetch, 0, 3, vec![]),
            StageReport::new(Stage::Normalize, 3, 3, vec![]),
            StageReport::new(Stage::Map, 3, 3, vec![]),
            StageReport::new(Stage::Ingest, 3, 3, vec![]),
        ]
    );
    assert_eq!(summary.ingest.inserted, 3);
    assert_eq!(factory.db().count().await.unwrap(), 3);
}

#[tokio::test]
async fn second_run_updates_in_place() {
    let factory = InMemoryDataStoreFactory::default();
    let fetcher = Arc::new(StaticFetcher::new(nodes::numbered(4)));

    run(config(), fetcher.clone(), Arc::new(factory.clone())).await;
    let summary = run(config(), fetcher.clone(), Arc::new(factory.clone())).await;

    assert!(summary.is_success());
    assert_eq!((summary.ingest.inserted, summary.ingest.updated), (0, 4));
    assert_eq!(factory.db().count().await.unwrap(), 4);
}

#[tokio::test]
async fn id_casing_change_between_runs_hits_the_same_row() {
    let factory = InMemoryDataStoreFactory::default();

    let first = run(
        config(),
        Arc::new(StaticFetcher::new(vec![node("mondo:0000001", "a")])),
        Arc::new(factory.clone()),
    )
    .await;
    let second = run(
        config(),
        Arc::new(StaticFetcher::new(vec![node("MONDO:0000001", "a")])),
        Arc::new(factory.clone()),
    )
    .await;

    assert_eq!((first.ingest.inserted, first.ingest.updated), (1, 0));
    assert_eq!((second.ingest.inserted, second.ingest.updated), (0, 1));
    assert_eq!(factory.db().count().await.unwrap(), 1);
    assert!(factory.db().get(&key(1)).await.unwrap().is_some());
}

#[tokio::test]
async fn configured_record_filters() {
    let factory = InMemoryDataStoreFactory::default();
    let summary = run(
        PipelineConfig {
            exclude_ids: vec!["MONDO_0000002".to_string()],
            ..config()
        },
        Arc::new(StaticFetcher::new(vec![
            node(&key(1), "breast carcinoma"),
            node(&key(2), "excluded disease"),
            node(&key(3), "feline leukemia"),
        ])),
        Arc::new(factory.clone()),
    )
    .await;

    assert!(summary.is_success());
    assert_eq!(
        (summary.normalize.excluded, summary.normalize.non_human),
        (1, 1)
    );
    assert_eq!(summary.ingest.inserted, 1);
    assert_eq!(factory.db().count().await.unwrap(), 1);
}

#[tokio::test]
async fn trial_limit_truncates_after_normalize() {
    let factory = InMemoryDataStoreFactory::default();
    let summary = run(
        PipelineConfig {
            trial_limit: 2,
            ..config()
        },
        Arc::new(StaticFetcher::new(nodes::numbered(5))),
        Arc::new(factory.clone()),
    )
    .await;

    assert!(summary.is_success());
    assert_eq!(summary.normalize.output, 5);
    assert_eq!(summary.skipped_trial, 3);
    assert_eq!(summary.total_skipped_trial(), 3);
    assert_eq!(summary.ingest.attempted, 2);
    assert_eq!(factory.db().count().await.unwrap(), 2);
}

#[tokio::test]
async fn transient_fetch_failure_is_retried() {
    let fetcher = Arc::new(
        StaticFetcher::new(nodes::numbered(1)).fail_first(IngestError::transient("503")),
    );
    let summary = run(
        config(),
        fetcher.clone(),
        Arc::new(InMemoryDataStoreFactory::default()),
    )
    .await;

    assert!(summary.is_success());
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
async fn fatal_fetch_failure_stops_the_run() {
    let fetcher =
        Arc::new(StaticFetcher::new(nodes::numbered(1)).fail_first(IngestError::fatal("404")));
    let summary = run(
        config(),
        fetcher.clone(),
        Arc::new(InMemoryDataStoreFactory::default()),
    )
    .await;

    assert_eq!(
        summary.outcome,
        RunOutcome::Failed {
            stage: Stage::Fetch,
            reason: "fatal failure: 404".to_string()
        }
    );
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(
        statuses(&summary),
        vec![
            (Stage::Fetch, StageStatus::Failed),
            (Stage::Normalize, StageStatus::Skipped),
            (Stage::Map, StageStatus::Skipped),
            (Stage::Ingest, StageStatus::Skipped),
        ]
    );
}

#[tokio::test]
async fn fetch_failure_without_stop_continues_empty() {
    let summary = run(
        PipelineConfig {
            stop_on_error: false,
            ..config()
        },
        Arc::new(StaticFetcher::new(vec![]).fail_first(IngestError::fatal("404"))),
        Arc::new(InMemoryDataStoreFactory::default()),
    )
    .await;

    assert_eq!(summary.outcome, RunOutcome::CompletedWithErrors);
    assert_eq!(
        statuses(&summary),
        vec![
            (Stage::Fetch, StageStatus::Failed),
            (Stage::Normalize, StageStatus::Succeeded),
            (Stage::Map, StageStatus::Succeeded),
            (Stage::Ingest, StageStatus::Succeeded),
        ]
    );
    assert_eq!(summary.ingest.attempted, 0);
}

#[rstest::rstest]
#[case::lenient(false, RunOutcome::Succeeded)]
#[case::strict(true, RunOutcome::Failed { stage: Stage::Normalize, reason: "1 malformed input records".to_string() })]
#[tokio::test]
async fn malformed_input_policy(#[case] strict_input: bool, #[case] outcome: RunOutcome) {
    let factory = InMemoryDataStoreFactory::default();
    let nodes = vec![
        node(&key(1), "first"),
        RawNode {
            id: None,
            ..node("", "no id")
        },
    ];
    let summary = run(
        PipelineConfig {
            strict_input,
            ..config()
        },
        Arc::new(StaticFetcher::new(nodes)),
        Arc::new(factory.clone()),
    )
    .await;

    assert_eq!(summary.outcome, outcome);
    assert_eq!(summary.normalize.malformed, 1);
    assert_eq!(summary.issues.len(), 1);
    assert_eq!(
        factory.db().count().await.unwrap(),
        if strict_input { 0 } else { 1 }
    );
}

#[tokio::test]
async fn failed_batch_without_stop_completes_with_errors() {
    let store = Arc::new(
        FaultyStore::new(Arc::new(InMemoryDb::new()))
            .fail_key(&key(3), IngestError::fatal("check constraint violated")),
    );
    let summary = run(
        PipelineConfig {
            stop_on_error: false,
            batch_size: 2,
            ..config()
        },
        Arc::new(StaticFetcher::new(nodes::numbered(5))),
        Arc::new(TestStoreFactory::from(store.clone())),
    )
    .await;

    assert_eq!(summary.outcome, RunOutcome::CompletedWithErrors);
    assert_eq!(
        summary.stage(Stage::Ingest).unwrap().errors,
        vec!["batch 2: fatal failure: check constraint violated".to_string()]
    );
    assert_eq!(
        summary.ingest.failed_keys().collect::<Vec<_>>(),
        vec![key(3).as_str(), key(4).as_str()]
    );
    assert_eq!(store.count().await.unwrap(), 3);
    assert_eq!(store.shutdowns(), 1);
}

#[tokio::test]
async fn transient_connect_failure_is_retried() {
    let factory = Arc::new(
        TestStoreFactory::new(Arc::new(InMemoryDb::new()))
            .fail_connect(IngestError::transient("too many connections")),
    );
    let summary = run(
        config(),
        Arc::new(StaticFetcher::new(nodes::numbered(2))),
        factory.clone(),
    )
    .await;

    assert!(summary.is_success());
    assert_eq!(factory.connects(), 2);
}

#[tokio::test]
async fn cancelled_run_fails_at_first_stage() {
    let cancel = CancellationToken::new();
    cancel.cancel();

    let fetcher = Arc::new(StaticFetcher::new(nodes::numbered(2)));
    let store = Arc::new(FaultyStore::new(Arc::new(InMemoryDb::new())));
    let summary = PipelineRunner::new(
        config(),
        frozen_system(fixed_time()),
        fetcher.clone(),
        Arc::new(TestStoreFactory::from(store.clone())),
    )
    .unwrap()
    .with_cancellation(cancel)
    .run()
    .await;

    assert_eq!(
        summary.outcome,
        RunOutcome::Failed {
            stage: Stage::Fetch,
            reason: "cancelled".to_string()
        }
    );
    assert!(store.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn run_deadline_interrupts_fetch() {
    let summary = run(
        PipelineConfig {
            run_timeout_ms: Some(1000),
            ..config()
        },
        Arc::new(StaticFetcher::new(nodes::numbered(2)).with_delay(Duration::from_secs(60))),
        Arc::new(InMemoryDataStoreFactory::default()),
    )
    .await;

    assert_eq!(
        summary.outcome,
        RunOutcome::Failed {
            stage: Stage::Fetch,
            reason: "run deadline exceeded".to_string()
        }
    );
}

#[test]
fn invalid_config_is_rejected() {
    let result = PipelineRunner::new(
        PipelineConfig {
            batch_size: 0,
            ..config()
        },
        frozen_system(fixed_time()),
        Arc::new(StaticFetcher::new(vec![])),
        Arc::new(InMemoryDataStoreFactory::default()),
    );

    assert!(matches!(result, Err(IngestError::InvalidConfig(_))));
}
