#![forbid(unsafe_code)]

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use mondo_ingest_core::{
    IngestError,
    data_store::DataStoreFactory,
    fetch::Fetcher,
    report::{RunOutcome, RunSummary},
    runner::PipelineRunner,
    system::System,
};
use mondo_ingest_obographs::{FileFetcher, HttpFetcher};
use mondo_ingest_store_inmemory::InMemoryDataStoreFactory;
use mondo_ingest_store_pg::PgDataStoreFactory;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{Subscriber, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{
    Layer, fmt::MakeWriter, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt,
};

use crate::config::{Backend, ModuleConfig, Overrides};

pub mod config;

/// This environment variable is used to control logs.
const LOG_ENV_VAR: &str = "LOG";

/// mondoctl – MONDO disease ontology ingestion
#[derive(Parser)]
#[command(version, about, arg_required_else_help(true))]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Fetch, normalize and ingest the ontology once
    Run(Run),
    /// Print the effective configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct ConfigArgs {
    /// JSON configuration file with a `mondo_ingest` module
    #[arg(short, long, default_value = "mondo-ingest.json")]
    pub config: PathBuf,

    #[command(flatten)]
    pub overrides: OverrideArgs,
}

#[derive(Args)]
pub struct Run {
    /// JSON configuration file with a `mondo_ingest` module
    #[arg(short, long, default_value = "mondo-ingest.json")]
    pub config: PathBuf,

    /// Read the ontology from a local OBO-Graphs file instead of downloading it
    #[arg(short('f'), long)]
    pub source_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: OverrideArgs,
}

#[derive(Args)]
pub struct OverrideArgs {
    /// Rows per storage call
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Persist at most this many records, 0 for no limit
    #[arg(long)]
    pub trial_limit: Option<usize>,

    /// Directory for the downloaded ontology
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Specify a data store backend
    #[arg(short('b'), long)]
    pub backend: Option<Backend>,

    /// Keep only neoplastic terms
    #[arg(long)]
    pub oncology_only: bool,

    /// Record failed stages and batches, but keep going
    #[arg(long)]
    pub continue_on_error: bool,

    /// Only ingest terms changed at or after this instant, e.g. 2024-06-01T00:00:00Z
    #[arg(long)]
    pub updated_since: Option<DateTime<Utc>>,

    /// Keep veterinary terms
    #[arg(long)]
    pub include_non_human: bool,

    /// Never ingest this term, may be repeated
    #[arg(long = "exclude-id", value_name = "MONDO_ID")]
    pub exclude_ids: Vec<String>,
}

impl From<OverrideArgs> for Overrides {
    fn from(args: OverrideArgs) -> Self {
        Self {
            batch_size: args.batch_size,
            trial_limit: args.trial_limit,
            cache_dir: args.cache_dir,
            backend: args.backend,
            oncology_only: args.oncology_only,
            continue_on_error: args.continue_on_error,
            updated_since: args.updated_since,
            include_non_human: args.include_non_human,
            exclude_ids: args.exclude_ids,
        }
    }
}

#[derive(Debug, Error)]
pub enum MondoctlError {
    #[error("could not read {}: {source}", .path.display())]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid configuration file: {0}")]
    ParseConfig(serde_json::Error),
    #[error("configuration has no `mondo_ingest` module")]
    MissingModule,
    #[error("the `mondo_ingest` module is disabled")]
    ModuleDisabled,
    #[error("the postgres backend needs a `postgres_url`")]
    MissingPostgresUrl,
    #[error("{0}")]
    Ingest(#[from] IngestError),
    #[error("{0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("run failed in {stage} stage: {reason}")]
    RunFailed { stage: String, reason: String },
}

pub async fn run() -> Result<(), MondoctlError> {
    let cli = Cli::parse();
    init_tracing();

    if let Some(command) = cli.command {
        run_command(command).await
    } else {
        Ok(())
    }
}

pub async fn run_command(command: Command) -> Result<(), MondoctlError> {
    match command {
        Command::Run(args) => {
            let config = load_config(&args.config, args.overrides.into())?;
            let summary = run_pipeline(config, args.source_file).await?;

            println!("{}", serde_json::to_string_pretty(&summary)?);

            match summary.outcome {
                RunOutcome::Failed { stage, reason } => Err(MondoctlError::RunFailed {
                    stage: stage.to_string(),
                    reason,
                }),
                _ => Ok(()),
            }
        }
        Command::Config(args) => {
            let config = load_config(&args.config, args.overrides.into())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn load_config(path: &Path, overrides: Overrides) -> Result<ModuleConfig, MondoctlError> {
    let mut config = ModuleConfig::load(path)?;
    config.apply(overrides);
    config.validate()?;
    Ok(config)
}

/// Run the pipeline once. Ctrl-C cancels the run between batches.
pub async fn run_pipeline(
    config: ModuleConfig,
    source_file: Option<PathBuf>,
) -> Result<RunSummary, MondoctlError> {
    let fetcher: Arc<dyn Fetcher + Send + Sync> = match source_file {
        Some(path) => {
            info!("reading ontology from {}", path.display());
            Arc::new(FileFetcher::new(path).include_obsolete(config.include_obsolete))
        }
        None => Arc::new(
            HttpFetcher::new(&config.source_url, &config.cache_dir)
                .force_refresh(config.force_refresh)
                .include_obsolete(config.include_obsolete),
        ),
    };

    let store_factory: Arc<dyn DataStoreFactory + Send + Sync> = match config.backend {
        Backend::InMemory => {
            warn!("using the in-memory backend, nothing is persisted");
            Arc::new(InMemoryDataStoreFactory::default())
        }
        Backend::Postgres => {
            let url = config
                .postgres_url
                .as_deref()
                .ok_or(MondoctlError::MissingPostgresUrl)?;
            Arc::new(
                PgDataStoreFactory::from_url(url)?
                    .with_statement_timeout(config.pipeline.retry_policy().call_timeout),
            )
        }
    };

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, stopping");
                cancel.cancel();
            }
        }
    });

    let runner = PipelineRunner::new(
        config.pipeline,
        Arc::new(System),
        fetcher,
        store_factory,
    )?
    .with_cancellation(cancel);

    Ok(runner.run().await)
}

/// Log lines for humans. stdout is reserved for the JSON output.
fn log_layer<S, W>(make_writer: W) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(make_writer)
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(log_layer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var(LOG_ENV_VAR)
                .from_env_lossy(),
        )
        .init();
}
