use std::sync::Arc;

use itertools::Itertools;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug_span, info, warn};

use crate::{
    IngestResult,
    config::PipelineConfig,
    data_store::DataStoreFactory,
    fetch::Fetcher,
    ingest::Ingestor,
    map::Mapper,
    normalize::{NormalizeStats, normalize_with},
    raw_node::RawNode,
    record::NormalizedRecord,
    report::{IngestReport, RecordIssue, RunOutcome, RunSummary, Stage, StageReport},
    retry::{RetryPolicy, RunGuard},
    row::Row,
    system::ArcSystemApi,
};

/// Runs fetch, normalize, map and ingest once.
///
/// A runner is built per run and consumed by [PipelineRunner::run].
pub struct PipelineRunner {
    config: PipelineConfig,
    system: ArcSystemApi,
    fetcher: Arc<dyn Fetcher + Send + Sync>,
    store_factory: Arc<dyn DataStoreFactory + Send + Sync>,
    cancel: CancellationToken,
}

impl PipelineRunner {
    pub fn new(
        config: PipelineConfig,
        system: ArcSystemApi,
        fetcher: Arc<dyn Fetcher + Send + Sync>,
        store_factory: Arc<dyn DataStoreFactory + Send + Sync>,
    ) -> IngestResult<Self> {
        config.validate()?;

        Ok(Self {
            config,
            system,
            fetcher,
            store_factory,
            cancel: CancellationToken::new(),
        })
    }

    /// Stop the run when `cancel` fires.
    pub fn with_cancellation(self, cancel: CancellationToken) -> Self {
        Self { cancel, ..self }
    }

    /// Execute the run. Failures are reported in the summary, never returned.
    pub async fn run(self) -> RunSummary {
        let run_id = self.system.generate_run_id();
        let started_at = self.system.current_time();
        info!("pipeline run {run_id} started");

        let guard = RunGuard::new(
            self.cancel.clone(),
            self.config
                .run_timeout()
                .map(|run_timeout| Instant::now() + run_timeout),
        );
        let mut state = RunState::new(self.config.stop_on_error);

        self.execute(&guard, &mut state)
            .instrument(debug_span!("run", %run_id))
            .await;

        let summary = RunSummary {
            run_id,
            release_version: state.release_version,
            started_at,
            finished_at: self.system.current_time(),
            outcome: state.stages.outcome(),
            stages: state.stages.reports,
            normalize: state.normalize,
            skipped_trial: state.skipped_trial,
            ingest: state.ingest,
            issues: state.issues,
        };

        match &summary.outcome {
            RunOutcome::Succeeded => info!("pipeline run {run_id} succeeded"),
            RunOutcome::CompletedWithErrors => {
                warn!("pipeline run {run_id} completed with errors")
            }
            RunOutcome::Failed { stage, reason } => {
                warn!("pipeline run {run_id} failed in {stage} stage: {reason}")
            }
        }

        summary
    }

    async fn execute(&self, guard: &RunGuard, state: &mut RunState) {
        let retry = self.config.retry_policy();

        let Some(nodes) = self.fetch(guard, &retry, state).await else {
            return;
        };
        let Some(records) = self.normalize(guard, nodes, state) else {
            return;
        };
        let Some(rows) = self.map(guard, &records, state) else {
            return;
        };
        self.ingest(guard, &retry, rows, state).await;
    }

    async fn fetch(
        &self,
        guard: &RunGuard,
        retry: &RetryPolicy,
        state: &mut RunState,
    ) -> Option<Vec<RawNode>> {
        info!("fetching ontology");
        let result = guard
            .interruptible(retry.run("fetch", guard, || self.fetcher.fetch()))
            .instrument(debug_span!("fetch"))
            .await;

        match result {
            Ok(fetched) => {
                info!(
                    "fetched {} nodes, release {}",
                    fetched.nodes.len(),
                    fetched.release_version.as_deref().unwrap_or("unknown")
                );
                state.release_version = fetched.release_version;
                state
                    .stages
                    .finish(StageReport::new(Stage::Fetch, 0, fetched.nodes.len(), vec![]), false);
                Some(fetched.nodes)
            }
            Err(error) => state
                .stages
                .finish(
                    StageReport::new(Stage::Fetch, 0, 0, vec![error.to_string()]),
                    error.is_run_terminal(),
                )
                .then(Vec::new),
        }
    }

    fn normalize(
        &self,
        guard: &RunGuard,
        nodes: Vec<RawNode>,
        state: &mut RunState,
    ) -> Option<Vec<NormalizedRecord>> {
        if !state.stages.proceed(Stage::Normalize, guard) {
            return None;
        }

        let _entered = debug_span!("normalize").entered();
        let mut normalized = normalize_with(nodes, &self.config.normalize_options());
        let stats = &normalized.stats;
        info!(
            "normalized {} nodes into {} records ({} merged, {} malformed, {} filtered out)",
            stats.input,
            stats.output,
            stats.merged_duplicates,
            stats.malformed,
            stats.excluded + stats.non_human + stats.not_updated + stats.filtered_out
        );
        for issue in &normalized.issues {
            warn!(
                "skipped `{}`: {}",
                issue.id.as_deref().unwrap_or("<no id>"),
                issue.reason
            );
        }

        let errors = if self.config.strict_input && stats.malformed > 0 {
            vec![format!("{} malformed input records", stats.malformed)]
        } else {
            vec![]
        };
        let report = StageReport::new(Stage::Normalize, stats.input, stats.output, errors);

        state.normalize = normalized.stats.clone();
        state.issues.append(&mut normalized.issues);
        if !state.stages.finish(report, false) {
            return None;
        }

        let mut records = normalized.records;
        let trial_limit = self.config.trial_limit;
        if trial_limit > 0 && records.len() > trial_limit {
            state.skipped_trial = records.len() - trial_limit;
            records.truncate(trial_limit);
            info!(
                "trial limit {trial_limit}: continuing with {} records, skipping {}",
                records.len(),
                state.skipped_trial
            );
        }

        Some(records)
    }

    fn map(
        &self,
        guard: &RunGuard,
        records: &[NormalizedRecord],
        state: &mut RunState,
    ) -> Option<Vec<Row>> {
        if !state.stages.proceed(Stage::Map, guard) {
            return None;
        }

        let _entered = debug_span!("map").entered();
        let mut mapped = Mapper::new(self.system.as_ref()).map(records);
        info!("mapped {} records into {} rows", records.len(), mapped.rows.len());

        let errors = mapped
            .issues
            .iter()
            .map(|issue| {
                format!(
                    "{}: {}",
                    issue.id.as_deref().unwrap_or("<no id>"),
                    issue.reason
                )
            })
            .collect();
        state.issues.append(&mut mapped.issues);

        state
            .stages
            .finish(
                StageReport::new(Stage::Map, records.len(), mapped.rows.len(), errors),
                false,
            )
            .then_some(mapped.rows)
    }

    async fn ingest(
        &self,
        guard: &RunGuard,
        retry: &RetryPolicy,
        rows: Vec<Row>,
        state: &mut RunState,
    ) {
        if !state.stages.proceed(Stage::Ingest, guard) {
            return;
        }

        let input = rows.len();
        info!("ingesting {input} rows");

        let store = match retry
            .run("connect", guard, || self.store_factory.connect())
            .await
        {
            Ok(store) => store,
            Err(error) => {
                state.ingest.halted_keys = rows.into_iter().map(|row| row.mondo_id).collect();
                state.ingest.skipped_halted = state.ingest.halted_keys.len();
                state.stages.finish(
                    StageReport::new(Stage::Ingest, input, 0, vec![error.to_string()]),
                    error.is_run_terminal(),
                );
                return;
            }
        };

        let report = Ingestor::new(store.clone())
            .with_retry(retry.clone())
            .with_guard(guard.clone())
            .ingest(rows, &self.config.ingest_options())
            .instrument(debug_span!("ingest"))
            .await;

        if let Err(error) = store.shutdown().await {
            warn!("could not shut down data store: {error}");
        }

        let mut errors: Vec<String> = report
            .failures
            .iter()
            .map(|failure| format!("batch {}: {}", failure.batch + 1, failure.reason))
            .dedup()
            .collect();
        let terminal = if report.is_clean() {
            None
        } else {
            guard.check().err()
        };
        if let Some(error) = &terminal {
            errors.push(error.to_string());
        }

        let output = report.inserted + report.updated;
        state.ingest = report;
        state.stages.finish(
            StageReport::new(Stage::Ingest, input, output, errors),
            terminal.is_some(),
        );
    }
}

/// Accumulates the results of one run.
struct RunState {
    stages: Stages,
    release_version: Option<String>,
    normalize: NormalizeStats,
    skipped_trial: usize,
    ingest: IngestReport,
    issues: Vec<RecordIssue>,
}

impl RunState {
    fn new(stop_on_error: bool) -> Self {
        Self {
            stages: Stages {
                stop_on_error,
                reports: vec![],
                any_failed: false,
                stopped_at: None,
            },
            release_version: None,
            normalize: NormalizeStats::default(),
            skipped_trial: 0,
            ingest: IngestReport::default(),
            issues: vec![],
        }
    }
}

struct Stages {
    stop_on_error: bool,
    reports: Vec<StageReport>,
    any_failed: bool,
    stopped_at: Option<(Stage, String)>,
}

impl Stages {
    /// Record a finished stage. Returns whether the run continues.
    fn finish(&mut self, report: StageReport, terminal: bool) -> bool {
        let stage = report.stage;

        if report.is_failed() {
            let reason = report.errors.iter().join("; ");
            warn!("{stage} stage failed: {reason}");
            self.any_failed = true;

            if self.stop_on_error || terminal {
                self.stopped_at = Some((stage, reason));
            }
        }
        self.reports.push(report);

        if self.stopped_at.is_some() {
            let mut next = stage.next();
            while let Some(skipped) = next {
                self.reports.push(StageReport::skipped(skipped));
                next = skipped.next();
            }
            return false;
        }

        true
    }

    /// Check for cancellation or an expired deadline before starting `stage`.
    fn proceed(&mut self, stage: Stage, guard: &RunGuard) -> bool {
        match guard.check() {
            Ok(()) => true,
            Err(error) => {
                self.finish(StageReport::new(stage, 0, 0, vec![error.to_string()]), true);
                false
            }
        }
    }

    fn outcome(&self) -> RunOutcome {
        match &self.stopped_at {
            Some((stage, reason)) => RunOutcome::Failed {
                stage: *stage,
                reason: reason.clone(),
            },
            None if self.any_failed => RunOutcome::CompletedWithErrors,
            None => RunOutcome::Succeeded,
        }
    }
}
