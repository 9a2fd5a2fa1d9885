//! nocturne-ap runtime configuration
//!
//! Merges the bootstrap [`TomlConfig`] with command-line overrides and builds
//! the audio backend and buffer loader the engine runs on.

use crate::audio::{
    AudioBackend, BufferLoader, CpalBackend, FetchDecodeLoader, FsFetcher, HeadlessBackend,
    HttpFetcher, SourceFetcher,
};
use crate::error::{Error, Result};
use crate::playback::{EngineConfig, SegmentDefaults};
use nocturne_common::config::{RootFolderResolver, TomlConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Values supplied on the command line; `None` keeps the config file value
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub root_folder: Option<PathBuf>,
    pub headless: bool,
    pub volume: Option<u8>,
    pub timer_minutes: Option<f64>,
    pub device: Option<String>,
}

/// Audio Player configuration
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    pub root_folder: PathBuf,
    /// Static audio directory (absolute, under the root folder unless the
    /// config gives an absolute path)
    pub audio_dir: PathBuf,
    pub audio_base_url: Option<String>,
    pub placeholder_source: String,
    pub nominal_gain: f32,
    pub volume: u8,
    pub timer_minutes: f64,
    pub event_capacity: usize,
    pub fetch_timeout: Option<Duration>,
    pub headless: bool,
    pub device: Option<String>,
    pub autoplay_suspended: bool,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl PlayerConfig {
    pub fn resolve(toml: &TomlConfig, overrides: ConfigOverrides) -> Result<Self> {
        let root_folder = RootFolderResolver::new()
            .with_cli_arg(overrides.root_folder)
            .with_toml(toml)
            .resolve();

        let player = &toml.player;
        let volume = overrides.volume.unwrap_or(player.default_volume);
        if volume > 100 {
            return Err(Error::Config(format!("volume {} above 100", volume)));
        }
        let timer_minutes = overrides
            .timer_minutes
            .unwrap_or(player.default_timer_minutes);
        if !timer_minutes.is_finite() || timer_minutes <= 0.0 {
            return Err(Error::InvalidTimer(timer_minutes));
        }

        Ok(Self {
            audio_dir: root_folder.join(&player.audio_dir),
            root_folder,
            audio_base_url: player
                .audio_base_url
                .clone()
                .filter(|url| !url.trim().is_empty()),
            placeholder_source: player.placeholder_source.clone(),
            nominal_gain: player.nominal_gain,
            volume,
            timer_minutes,
            event_capacity: player.event_capacity,
            fetch_timeout: player.fetch_timeout_secs.map(Duration::from_secs),
            headless: overrides.headless || player.output.headless,
            device: overrides.device.or_else(|| player.output.device.clone()),
            autoplay_suspended: player.output.autoplay_suspended,
            log_level: toml.logging.level.clone(),
            log_file: toml.logging.file.clone(),
        })
    }

    /// Output backend: silent clock-driven or a cpal device
    pub fn build_backend(&self) -> Arc<dyn AudioBackend> {
        if self.headless {
            info!("Using headless audio output");
            Arc::new(HeadlessBackend::default().start_suspended(self.autoplay_suspended))
        } else {
            Arc::new(
                CpalBackend::new(self.device.clone()).start_suspended(self.autoplay_suspended),
            )
        }
    }

    /// Buffer loader over HTTP when a base URL is configured, else the
    /// static audio directory
    pub fn build_loader(&self) -> Result<Arc<dyn BufferLoader>> {
        let fetcher: Arc<dyn SourceFetcher> = match &self.audio_base_url {
            Some(base_url) => {
                info!("Fetching audio from {}", base_url);
                Arc::new(HttpFetcher::new(base_url.clone(), self.fetch_timeout)?)
            }
            None => {
                info!("Reading audio from {}", self.audio_dir.display());
                Arc::new(FsFetcher::new(self.audio_dir.clone()))
            }
        };

        Ok(Arc::new(
            FetchDecodeLoader::new(fetcher).with_placeholder(self.placeholder_source.clone()),
        ))
    }

    pub fn segment_defaults(&self) -> SegmentDefaults {
        SegmentDefaults {
            placeholder_source: self.placeholder_source.clone(),
            nominal_gain: self.nominal_gain,
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            defaults: self.segment_defaults(),
            initial_volume: self.volume,
            event_capacity: self.event_capacity,
        }
    }

    /// `EnvFilter` directive for the configured level.
    ///
    /// A bare level applies to the nocturne crates only; anything containing
    /// `=` or `,` is used verbatim.
    pub fn log_filter(&self) -> String {
        let level = self.log_level.trim();
        if level.contains('=') || level.contains(',') {
            level.to_string()
        } else {
            format!("nocturne_ap={0},nocturne_common={0}", level)
        }
    }
}
