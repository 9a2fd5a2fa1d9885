//! Buffer loading: fetch, decode, resample
//!
//! [`BufferLoader`] is the seam between the buffer cache and the outside
//! world. The production loader fetches bytes through a [`SourceFetcher`] and
//! runs the CPU-bound decode and resample on the blocking pool.

use crate::audio::decode::decode_bytes;
use crate::audio::fetch::SourceFetcher;
use crate::audio::resampler::Resampler;
use crate::audio::types::DecodedBuffer;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Length of the silence synthesized for a missing placeholder source
pub const PLACEHOLDER_SILENCE_SECS: f64 = 10.0;

/// Produces decoded buffers at a requested sample rate
#[async_trait]
pub trait BufferLoader: Send + Sync {
    /// Load `source_id` as stereo f32 at `sample_rate`.
    ///
    /// Failures are reported as [`Error::AudioLoad`].
    async fn load(&self, source_id: &str, sample_rate: u32) -> Result<DecodedBuffer>;
}

/// Loader that fetches encoded files and decodes them with symphonia
pub struct FetchDecodeLoader {
    fetcher: Arc<dyn SourceFetcher>,
    placeholder: Option<String>,
}

impl FetchDecodeLoader {
    pub fn new(fetcher: Arc<dyn SourceFetcher>) -> Self {
        Self {
            fetcher,
            placeholder: None,
        }
    }

    /// Source identifier that may be synthesized as silence when absent
    pub fn with_placeholder(mut self, source_id: impl Into<String>) -> Self {
        self.placeholder = Some(source_id.into());
        self
    }

    fn is_placeholder(&self, source_id: &str) -> bool {
        self.placeholder.as_deref() == Some(source_id)
    }
}

/// File extension of a source identifier, ignoring any URL query
fn extension_hint(source_id: &str) -> Option<String> {
    let path = source_id.split(['?', '#']).next().unwrap_or(source_id);
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

#[async_trait]
impl BufferLoader for FetchDecodeLoader {
    async fn load(&self, source_id: &str, sample_rate: u32) -> Result<DecodedBuffer> {
        if self.is_placeholder(source_id) && !self.fetcher.exists(source_id).await {
            info!(
                "Placeholder '{}' not found, using {}s of generated silence",
                source_id, PLACEHOLDER_SILENCE_SECS
            );
            return Ok(DecodedBuffer::silence(
                source_id,
                PLACEHOLDER_SILENCE_SECS,
                sample_rate,
            ));
        }

        let bytes = self.fetcher.fetch(source_id).await?;
        debug!("Fetched {} bytes for '{}'", bytes.len(), source_id);

        let id = source_id.to_string();
        let extension = extension_hint(source_id);
        let decoded = tokio::task::spawn_blocking(move || {
            let audio = decode_bytes(bytes, extension.as_deref())?;
            let samples = Resampler::resample(&audio.samples, audio.sample_rate, sample_rate, 2)?;
            Ok::<_, String>(samples)
        })
        .await
        .map_err(|e| Error::load(&id, format!("decode task failed: {}", e)))?
        .map_err(|reason| Error::load(&id, reason))?;

        let buffer = DecodedBuffer::new(id, decoded, sample_rate, 2);
        info!(
            "Loaded '{}' ({:.2}s at {} Hz)",
            buffer.source_id,
            buffer.duration_secs(),
            sample_rate
        );
        Ok(buffer)
    }
}
