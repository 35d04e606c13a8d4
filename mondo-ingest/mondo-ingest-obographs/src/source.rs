use std::path::{Path, PathBuf};

use mondo_ingest_core::{IngestError, IngestResult, fetch::FetchedOntology, fetch::Fetcher};
use reqwest::{
    StatusCode,
    header::{ACCEPT, ETAG, IF_NONE_MATCH},
};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::graph::parse_document;

pub const DEFAULT_SOURCE_URL: &str = "http://purl.obolibrary.org/obo/mondo.json";

const CACHE_FILE_NAME: &str = "mondo.json";

/// Reads an OBO-Graphs document from a local file.
pub struct FileFetcher {
    path: PathBuf,
    include_obsolete: bool,
}

impl FileFetcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            include_obsolete: false,
        }
    }

    pub fn include_obsolete(self, include_obsolete: bool) -> Self {
        Self {
            include_obsolete,
            ..self
        }
    }
}

#[async_trait::async_trait]
impl Fetcher for FileFetcher {
    async fn fetch(&self) -> IngestResult<FetchedOntology> {
        load(&self.path, self.include_obsolete).await
    }
}

/// Downloads `mondo.json` into a cache directory and parses it from there.
///
/// A cached copy is used as is, unless `force_refresh` is set. A refresh sends the
/// stored ETag, so an unchanged release is not downloaded again.
pub struct HttpFetcher {
    client: reqwest::Client,
    source_url: String,
    cache_dir: PathBuf,
    force_refresh: bool,
    include_obsolete: bool,
}

impl HttpFetcher {
    pub fn new(source_url: impl Into<String>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            client: reqwest::Client::new(),
            source_url: source_url.into(),
            cache_dir: cache_dir.into(),
            force_refresh: false,
            include_obsolete: false,
        }
    }

    pub fn force_refresh(self, force_refresh: bool) -> Self {
        Self {
            force_refresh,
            ..self
        }
    }

    pub fn include_obsolete(self, include_obsolete: bool) -> Self {
        Self {
            include_obsolete,
            ..self
        }
    }

    pub fn cache_path(&self) -> PathBuf {
        self.cache_dir.join(CACHE_FILE_NAME)
    }

    fn etag_path(&self) -> PathBuf {
        self.cache_dir.join(format!("{CACHE_FILE_NAME}.etag"))
    }

    async fn download(&self, cached: bool) -> IngestResult<()> {
        info!("downloading {}", self.source_url);

        let mut request = self
            .client
            .get(&self.source_url)
            .header(ACCEPT, "application/json");

        if cached {
            if let Ok(etag) = tokio::fs::read_to_string(self.etag_path()).await {
                request = request.header(IF_NONE_MATCH, etag.trim());
            }
        }

        let mut response = request.send().await.map_err(request_error)?;

        match response.status() {
            StatusCode::NOT_MODIFIED => {
                info!("cached ontology is current");
                return Ok(());
            }
            status if status.is_success() => {}
            status => return Err(status_error(status, &self.source_url)),
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|etag| etag.to_str().ok())
            .map(str::to_string);

        let cache_path = self.cache_path();
        let tmp_path = cache_path.with_extension("json.tmp");
        let mut file = tokio::fs::File::create(&tmp_path)
            .await
            .map_err(|error| io_error(&tmp_path, error))?;
        let mut bytes = 0;

        while let Some(chunk) = response.chunk().await.map_err(request_error)? {
            bytes += chunk.len();
            file.write_all(&chunk)
                .await
                .map_err(|error| io_error(&tmp_path, error))?;
        }
        file.flush()
            .await
            .map_err(|error| io_error(&tmp_path, error))?;
        drop(file);

        tokio::fs::rename(&tmp_path, &cache_path)
            .await
            .map_err(|error| io_error(&cache_path, error))?;

        if let Some(etag) = etag {
            tokio::fs::write(self.etag_path(), etag)
                .await
                .map_err(|error| io_error(&self.etag_path(), error))?;
        }

        info!("downloaded {bytes} bytes to {}", cache_path.display());

        Ok(())
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self) -> IngestResult<FetchedOntology> {
        tokio::fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(|error| io_error(&self.cache_dir, error))?;

        let cache_path = self.cache_path();
        let cached = tokio::fs::try_exists(&cache_path).await.unwrap_or(false);

        if cached && !self.force_refresh {
            debug!("using cached {}", cache_path.display());
        } else {
            self.download(cached).await?;
        }

        load(&cache_path, self.include_obsolete).await
    }
}

async fn load(path: &Path, include_obsolete: bool) -> IngestResult<FetchedOntology> {
    info!("loading ontology from {}", path.display());
    let json = tokio::fs::read(path)
        .await
        .map_err(|error| io_error(path, error))?;

    tokio::task::spawn_blocking(move || parse_document(&json, include_obsolete))
        .await
        .map_err(|error| IngestError::fatal(format!("ontology parser: {error}")))?
}

fn io_error(path: &Path, error: std::io::Error) -> IngestError {
    IngestError::fatal(format!("{}: {error}", path.display()))
}

fn request_error(error: reqwest::Error) -> IngestError {
    match error.status() {
        Some(status) => status_error(status, error.url().map_or("", |url| url.as_str())),
        None if error.is_builder() => IngestError::fatal(format!("ontology download: {error}")),
        None => IngestError::transient(format!("ontology download: {error}")),
    }
}

fn status_error(status: StatusCode, url: &str) -> IngestError {
    let message = format!("ontology download from {url}: {status}");

    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        IngestError::transient(message)
    } else {
        IngestError::fatal(message)
    }
}
