use tracing::{Instrument, debug, debug_span, info, warn};

use crate::{
    config::IngestOptions,
    data_store::{ArcDataStore, UpsertOutcome},
    report::{IngestReport, RowFailure},
    retry::{RetryPolicy, RunGuard},
    row::Row,
};

/// Applies rows to a data store in sequential, atomic batches.
pub struct Ingestor {
    store: ArcDataStore,
    retry: RetryPolicy,
    guard: RunGuard,
}

impl Ingestor {
    pub fn new(store: ArcDataStore) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
            guard: RunGuard::default(),
        }
    }

    /// Retry batches with `retry`, minus its call timeout.
    ///
    /// A batch is a transaction that may still commit after a client-side timeout fires,
    /// so it is left to run to completion. Stores bound it server-side instead.
    pub fn with_retry(self, retry: RetryPolicy) -> Self {
        Self {
            retry: retry.with_call_timeout(None),
            ..self
        }
    }

    pub fn with_guard(self, guard: RunGuard) -> Self {
        Self { guard, ..self }
    }

    /// Upsert `rows`, never failing as a whole.
    ///
    /// A failed batch has all its keys listed in the report. With `stop_on_error`,
    /// or once the run is cancelled or past its deadline, no further batches are sent
    /// and the remaining keys are reported as halted.
    pub async fn ingest(&self, mut rows: Vec<Row>, options: &IngestOptions) -> IngestReport {
        let mut report = IngestReport::default();

        if options.trial_limit > 0 && rows.len() > options.trial_limit {
            report.skipped_trial = rows.len() - options.trial_limit;
            rows.truncate(options.trial_limit);
            info!(
                "trial limit {} reached, skipping {} rows",
                options.trial_limit, report.skipped_trial
            );
        }

        let batch_size = options.batch_size.max(1);
        let batch_count = rows.len().div_ceil(batch_size);
        let mut halted = false;

        for (index, batch) in rows.chunks(batch_size).enumerate() {
            if !halted {
                if let Err(error) = self.guard.check() {
                    warn!("ingest halted before batch {}: {error}", index + 1);
                    halted = true;
                }
            }
            if halted {
                report.skipped_halted += batch.len();
                report
                    .halted_keys
                    .extend(batch.iter().map(|row| row.mondo_id.clone()));
                continue;
            }

            let what = format!("batch {}/{batch_count}", index + 1);
            let result = self
                .retry
                .run(&what, &self.guard, || self.store.upsert_batch(batch))
                .instrument(debug_span!("batch", index, len = batch.len()))
                .await;

            report.attempted += batch.len();

            match result {
                Ok(outcomes) => {
                    let inserted = outcomes
                        .iter()
                        .filter(|outcome| **outcome == UpsertOutcome::Inserted)
                        .count();
                    let updated = outcomes.len() - inserted;
                    report.inserted += inserted;
                    report.updated += updated;
                    debug!("{what}: {inserted} inserted, {updated} updated");
                }
                Err(error) => {
                    warn!("{what} failed: {error}");
                    let reason = error.to_string();
                    report.failed += batch.len();
                    report
                        .failures
                        .extend(batch.iter().map(|row| RowFailure {
                            mondo_id: row.mondo_id.clone(),
                            batch: index,
                            reason: reason.clone(),
                        }));

                    if options.stop_on_error || error.is_run_terminal() {
                        halted = true;
                    }
                }
            }
        }

        info!(
            "ingested {} rows: {} inserted, {} updated, {} failed, {} halted",
            report.attempted,
            report.inserted,
            report.updated,
            report.failed,
            report.skipped_halted
        );

        report
    }
}
