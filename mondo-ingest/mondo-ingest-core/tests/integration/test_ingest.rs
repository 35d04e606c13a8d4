use std::{sync::Arc, time::Duration};

use chrono::TimeDelta;
use mondo_ingest_core::{
    IngestError,
    config::IngestOptions,
    data_store::DataStoreAPI,
    ingest::Ingestor,
    report::RowFailure,
    retry::{RetryPolicy, RunGuard},
};
use mondo_ingest_store_inmemory::InMemoryDb;
use mondo_ingest_test_utils::{faulty_store::FaultyStore, system::fixed_time};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use crate::{key, rows};

fn options(batch_size: usize, stop_on_error: bool) -> IngestOptions {
    IngestOptions {
        batch_size,
        trial_limit: 0,
        stop_on_error,
    }
}

#[tokio::test]
async fn ingest_twice_is_idempotent() {
    let db = Arc::new(InMemoryDb::new());
    let ingestor = Ingestor::new(db.clone()).with_retry(RetryPolicy::immediate(1));

    let first = ingestor
        .ingest(rows(3, fixed_time()), &options(2, true))
        .await;
    assert_eq!((first.inserted, first.updated), (3, 0));

    let later = fixed_time() + TimeDelta::days(1);
    let second = ingestor.ingest(rows(3, later), &options(2, true)).await;
    assert_eq!((second.inserted, second.updated), (0, 3));

    assert_eq!(db.count().await.unwrap(), 3);
    for stored in db.rows().await {
        assert_eq!(stored.created_at, fixed_time());
    }
    let expected = rows(3, later);
    let stored = db.rows().await;
    for (stored, expected) in stored.iter().zip(&expected) {
        assert!(stored.same_content(expected));
    }
}

#[tokio::test]
async fn trial_limit_caps_ingested_rows() {
    let db = Arc::new(InMemoryDb::new());
    let report = Ingestor::new(db.clone())
        .ingest(
            rows(5, fixed_time()),
            &IngestOptions {
                batch_size: 10,
                trial_limit: 2,
                stop_on_error: true,
            },
        )
        .await;

    assert_eq!(report.attempted, 2);
    assert_eq!(report.inserted, 2);
    assert_eq!(report.skipped_trial, 3);
    assert!(report.is_clean());
    assert_eq!(db.count().await.unwrap(), 2);
}

#[rstest::rstest]
#[case::stop_on_error(true, 2, 4)]
#[case::continue_on_error(false, 4, 5)]
#[tokio::test]
async fn failing_batch_is_isolated(
    #[case] stop_on_error: bool,
    #[case] persisted: usize,
    #[case] store_calls: usize,
) {
    let store = Arc::new(
        FaultyStore::new(Arc::new(InMemoryDb::new()))
            .fail_key(&key(3), IngestError::transient("deadlock detected")),
    );
    let report = Ingestor::new(store.clone())
        .with_retry(RetryPolicy::immediate(3))
        .ingest(rows(6, fixed_time()), &options(2, stop_on_error))
        .await;

    let reason = "gave up after 3 attempts: transient failure: deadlock detected";
    assert_eq!(
        report.failures,
        vec![
            RowFailure {
                mondo_id: key(3),
                batch: 1,
                reason: reason.to_string()
            },
            RowFailure {
                mondo_id: key(4),
                batch: 1,
                reason: reason.to_string()
            },
        ]
    );
    assert_eq!(report.failed, 2);
    assert_eq!(report.inserted, persisted);
    assert_eq!(store.count().await.unwrap(), persisted);
    assert_eq!(store.calls().len(), store_calls);

    if stop_on_error {
        assert_eq!(report.attempted, 4);
        assert_eq!(report.skipped_halted, 2);
        assert_eq!(report.halted_keys, vec![key(5), key(6)]);
    } else {
        assert_eq!(report.attempted, 6);
        assert_eq!(report.skipped_halted, 0);
        assert_eq!(store.get(&key(6)).await.unwrap().unwrap().mondo_id, key(6));
    }
}

#[tokio::test]
async fn fatal_failure_is_not_retried() {
    let store = Arc::new(
        FaultyStore::new(Arc::new(InMemoryDb::new()))
            .fail_call(0, IngestError::fatal("permission denied for table")),
    );
    let report = Ingestor::new(store.clone())
        .with_retry(RetryPolicy::immediate(5))
        .ingest(rows(2, fixed_time()), &options(10, true))
        .await;

    assert_eq!(store.calls().len(), 1);
    assert_eq!(report.failed, 2);
    assert_eq!(
        report.failed_keys().collect::<Vec<_>>(),
        vec![key(1).as_str(), key(2).as_str()]
    );
}

#[tokio::test]
async fn transient_failure_is_retried() {
    let store = Arc::new(
        FaultyStore::new(Arc::new(InMemoryDb::new()))
            .fail_call(0, IngestError::transient("connection reset")),
    );
    let report = Ingestor::new(store.clone())
        .with_retry(RetryPolicy::immediate(3))
        .ingest(rows(2, fixed_time()), &options(10, true))
        .await;

    assert_eq!(store.calls().len(), 2);
    assert_eq!(report.inserted, 2);
    assert!(report.is_clean());
}

#[tokio::test(start_paused = true)]
async fn slow_batch_runs_past_the_call_timeout() {
    let db = Arc::new(InMemoryDb::new());
    let store = Arc::new(FaultyStore::new(db.clone()).with_delay(Duration::from_secs(5)));
    let report = Ingestor::new(store.clone())
        .with_retry(RetryPolicy::immediate(3).with_call_timeout(Some(Duration::from_secs(1))))
        .ingest(rows(2, fixed_time()), &options(10, true))
        .await;

    assert_eq!(store.calls().len(), 1);
    assert_eq!((report.inserted, report.updated), (2, 0));
    assert!(report.is_clean());
    assert_eq!(db.count().await.unwrap(), 2);
}

#[tokio::test]
async fn cancelled_ingest_sends_nothing() {
    let cancel = CancellationToken::new();
    cancel.cancel();

    let store = Arc::new(FaultyStore::new(Arc::new(InMemoryDb::new())));
    let report = Ingestor::new(store.clone())
        .with_guard(RunGuard::new(cancel, None))
        .ingest(rows(3, fixed_time()), &options(2, false))
        .await;

    assert!(store.calls().is_empty());
    assert_eq!(report.attempted, 0);
    assert_eq!(report.skipped_halted, 3);
    assert_eq!(report.halted_keys, vec![key(1), key(2), key(3)]);
}
