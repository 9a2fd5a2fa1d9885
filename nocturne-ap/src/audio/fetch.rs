//! Raw byte fetching for audio sources
//!
//! Sources are opaque identifiers (a file name such as `forest.mp3`, or a
//! full URL). A [`SourceFetcher`] turns one into the encoded file bytes.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Fetches the encoded bytes of an audio source
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, source_id: &str) -> Result<Vec<u8>>;

    /// Whether `source_id` names something this fetcher can find.
    ///
    /// Used to decide whether a missing placeholder may be synthesized.
    async fn exists(&self, source_id: &str) -> bool;
}

fn is_url(source_id: &str) -> bool {
    source_id.starts_with("http://") || source_id.starts_with("https://")
}

/// Reads sources from a static audio directory
#[derive(Debug, Clone)]
pub struct FsFetcher {
    audio_dir: PathBuf,
}

impl FsFetcher {
    pub fn new(audio_dir: impl Into<PathBuf>) -> Self {
        Self {
            audio_dir: audio_dir.into(),
        }
    }

    /// Map a source identifier to a path inside the audio directory.
    ///
    /// Only plain relative paths are accepted; `..`, absolute paths and URLs
    /// are rejected.
    pub fn resolve(&self, source_id: &str) -> Result<PathBuf> {
        if source_id.is_empty() || is_url(source_id) {
            return Err(Error::load(source_id, "not a local audio file name"));
        }

        let relative = Path::new(source_id);
        let plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !plain {
            return Err(Error::load(source_id, "path escapes the audio directory"));
        }

        Ok(self.audio_dir.join(relative))
    }
}

#[async_trait]
impl SourceFetcher for FsFetcher {
    async fn fetch(&self, source_id: &str) -> Result<Vec<u8>> {
        let path = self.resolve(source_id)?;
        debug!("Reading audio file {:?}", path);
        tokio::fs::read(&path)
            .await
            .map_err(|e| Error::load(source_id, format!("{}: {}", path.display(), e)))
    }

    async fn exists(&self, source_id: &str) -> bool {
        match self.resolve(source_id) {
            Ok(path) => tokio::fs::metadata(&path).await.is_ok(),
            Err(_) => false,
        }
    }
}

/// Fetches sources over HTTP relative to a base URL.
///
/// Identifiers that are already absolute URLs are fetched as-is.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFetcher {
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn url_for(&self, source_id: &str) -> String {
        if is_url(source_id) {
            source_id.to_string()
        } else {
            format!(
                "{}/{}",
                self.base_url.trim_end_matches('/'),
                source_id.trim_start_matches('/')
            )
        }
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, source_id: &str) -> Result<Vec<u8>> {
        let url = self.url_for(source_id);
        debug!("Fetching audio {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::load(source_id, e))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::load(source_id, e))?;
        Ok(bytes.to_vec())
    }

    async fn exists(&self, source_id: &str) -> bool {
        match self.client.head(self.url_for(source_id)).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}
