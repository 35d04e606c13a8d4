use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use mondo_ingest_core::config::PipelineConfig;
use mondo_ingest_obographs::DEFAULT_SOURCE_URL;
use serde::{Deserialize, Serialize};

use crate::MondoctlError;

/// The configuration file. Other modules may live next to `mondo_ingest`, they are ignored.
#[derive(Debug, Deserialize)]
pub struct ConfigFile {
    mondo_ingest: Option<ModuleConfig>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModuleConfig {
    pub enabled: bool,
    pub source_url: String,
    pub cache_dir: PathBuf,
    pub force_refresh: bool,
    pub include_obsolete: bool,
    pub backend: Backend,
    pub postgres_url: Option<String>,
    pub pipeline: PipelineConfig,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            source_url: DEFAULT_SOURCE_URL.to_string(),
            cache_dir: PathBuf::from(".cache/mondo"),
            force_refresh: false,
            include_obsolete: false,
            backend: Backend::InMemory,
            postgres_url: None,
            pipeline: PipelineConfig::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[value(name = "inmemory")]
    InMemory,
    Postgres,
}

/// Command line settings that take precedence over the file.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub batch_size: Option<usize>,
    pub trial_limit: Option<usize>,
    pub cache_dir: Option<PathBuf>,
    pub backend: Option<Backend>,
    pub oncology_only: bool,
    pub continue_on_error: bool,
    pub updated_since: Option<DateTime<Utc>>,
    pub include_non_human: bool,
    /// Added to the configured exclusions.
    pub exclude_ids: Vec<String>,
}

impl ModuleConfig {
    pub fn load(path: &Path) -> Result<Self, MondoctlError> {
        let json = std::fs::read_to_string(path).map_err(|source| MondoctlError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&json)
    }

    pub fn parse(json: &str) -> Result<Self, MondoctlError> {
        let file: ConfigFile = serde_json::from_str(json).map_err(MondoctlError::ParseConfig)?;
        let module = file.mondo_ingest.ok_or(MondoctlError::MissingModule)?;

        if !module.enabled {
            return Err(MondoctlError::ModuleDisabled);
        }

        Ok(module)
    }

    pub fn apply(&mut self, overrides: Overrides) {
        let pipeline = &mut self.pipeline;

        if let Some(batch_size) = overrides.batch_size {
            pipeline.batch_size = batch_size;
        }
        if let Some(trial_limit) = overrides.trial_limit {
            pipeline.trial_limit = trial_limit;
        }
        if overrides.oncology_only {
            pipeline.filter_oncology_only = true;
        }
        if overrides.continue_on_error {
            pipeline.stop_on_error = false;
        }
        if let Some(updated_since) = overrides.updated_since {
            pipeline.updated_since = Some(updated_since);
        }
        if overrides.include_non_human {
            pipeline.human_only = false;
        }
        pipeline.exclude_ids.extend(overrides.exclude_ids);
        if let Some(cache_dir) = overrides.cache_dir {
            self.cache_dir = cache_dir;
        }
        if let Some(backend) = overrides.backend {
            self.backend = backend;
        }
    }

    /// Check everything that can be checked before connecting anywhere.
    pub fn validate(&self) -> Result<(), MondoctlError> {
        self.pipeline.validate()?;

        if self.backend == Backend::Postgres && self.postgres_url.is_none() {
            return Err(MondoctlError::MissingPostgresUrl);
        }

        Ok(())
    }
}
