//! Bootstrap configuration loading and root folder resolution
//!
//! Configuration sources, highest priority first:
//! 1. Command-line arguments
//! 2. Environment variables (`NOCTURNE_CONFIG`, `NOCTURNE_ROOT_FOLDER`)
//! 3. TOML configuration file
//! 4. Compiled defaults
//!
//! A missing config file is not an error: the player starts on compiled
//! defaults and logs a warning. A config file that exists but fails to parse
//! is an error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "NOCTURNE_CONFIG";

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV_VAR: &str = "NOCTURNE_ROOT_FOLDER";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the audio directory (optional)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub player: PlayerSettings,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter directive (trace, debug, info, warn, error, or a full
    /// `EnvFilter` string)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Player settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSettings {
    /// Audio directory, relative to the root folder unless absolute
    #[serde(default = "default_audio_dir")]
    pub audio_dir: PathBuf,

    /// Base URL for remote sources; when set, sources are fetched over HTTP
    #[serde(default)]
    pub audio_base_url: Option<String>,

    /// Source played by segments without an `audio_url`
    #[serde(default = "default_placeholder_source")]
    pub placeholder_source: String,

    /// Segment gain when the catalog record omits one
    #[serde(default = "default_nominal_gain")]
    pub nominal_gain: f32,

    /// Initial master volume (percent, 0-100)
    #[serde(default = "default_volume")]
    pub default_volume: u8,

    /// Session timer used when the CLI gives none (minutes)
    #[serde(default = "default_timer_minutes")]
    pub default_timer_minutes: f64,

    /// Broadcast channel capacity for playback events
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// HTTP fetch timeout; no timeout when absent
    #[serde(default)]
    pub fetch_timeout_secs: Option<u64>,

    #[serde(default)]
    pub output: OutputConfig,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            audio_dir: default_audio_dir(),
            audio_base_url: None,
            placeholder_source: default_placeholder_source(),
            nominal_gain: default_nominal_gain(),
            default_volume: default_volume(),
            default_timer_minutes: default_timer_minutes(),
            event_capacity: default_event_capacity(),
            fetch_timeout_secs: None,
            output: OutputConfig::default(),
        }
    }
}

/// Audio output settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Use the silent clock-driven backend instead of a sound device
    #[serde(default)]
    pub headless: bool,

    /// Output device name (system default when absent)
    #[serde(default)]
    pub device: Option<String>,

    /// Create the context suspended, as a browser does before a user gesture
    #[serde(default)]
    pub autoplay_suspended: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_audio_dir() -> PathBuf {
    PathBuf::from("audio")
}

fn default_placeholder_source() -> String {
    "silence.mp3".to_string()
}

fn default_nominal_gain() -> f32 {
    0.7
}

fn default_volume() -> u8 {
    80
}

fn default_timer_minutes() -> f64 {
    30.0
}

fn default_event_capacity() -> usize {
    256
}

impl TomlConfig {
    /// Parse a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Load the config file selected by [`resolve_config_path`], falling back
    /// to compiled defaults when no file exists.
    pub fn load_or_default(cli_path: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_path) {
            Some(path) if path.exists() => {
                debug!("Loading configuration from {:?}", path);
                Self::load(&path)
            }
            Some(path) if cli_path.is_some() => {
                // An explicitly requested file must exist
                Err(Error::Config(format!("Config file not found: {:?}", path)))
            }
            Some(path) => {
                warn!("Config file {:?} not found, using defaults", path);
                Ok(Self::default())
            }
            None => {
                warn!("No config directory available, using defaults");
                Ok(Self::default())
            }
        }
    }

    fn validate(&self) -> Result<()> {
        let player = &self.player;
        if !(0.0..=1.0).contains(&player.nominal_gain) {
            return Err(Error::Config(format!(
                "player.nominal_gain {} outside 0.0-1.0",
                player.nominal_gain
            )));
        }
        if player.default_volume > 100 {
            return Err(Error::Config(format!(
                "player.default_volume {} above 100",
                player.default_volume
            )));
        }
        if player.event_capacity == 0 {
            return Err(Error::Config(
                "player.event_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Choose the config file path: CLI, then `NOCTURNE_CONFIG`, then the
/// platform config directory (`~/.config/nocturne/config.toml` on Linux).
pub fn resolve_config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    dirs::config_dir().map(|d| d.join("nocturne").join("config.toml"))
}

/// Compiled defaults for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            log_level: default_log_level(),
        }
    }
}

/// Platform default root folder (`~/.local/share/nocturne` on Linux)
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("nocturne"))
        .unwrap_or_else(|| PathBuf::from("./nocturne_data"))
}

/// Root folder resolution
///
/// Priority: CLI argument, `NOCTURNE_ROOT_FOLDER`, TOML `root_folder`,
/// platform default.
#[derive(Debug, Clone, Default)]
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    toml_value: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    pub fn with_toml(mut self, config: &TomlConfig) -> Self {
        self.toml_value = config.root_folder.clone();
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            debug!("Root folder {:?} (from command line)", path);
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV_VAR) {
            if !path.is_empty() {
                debug!("Root folder {:?} (from {})", path, ROOT_FOLDER_ENV_VAR);
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_value {
            debug!("Root folder {:?} (from config file)", path);
            return path.clone();
        }

        CompiledDefaults::for_current_platform().root_folder
    }
}
