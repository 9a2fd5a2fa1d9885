//! Error types for nocturne-ap
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for nocturne-ap
#[derive(Error, Debug)]
pub enum Error {
    /// No usable audio output primitive on this platform
    #[error("Audio unsupported: {0}")]
    AudioUnsupported(String),

    /// A source failed to fetch or decode
    #[error("Failed to load audio '{source_id}': {reason}")]
    AudioLoad { source_id: String, reason: String },

    /// Operation on a closed context or a graph that was never initialized
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Journey record cannot be played
    #[error("Invalid journey: {0}")]
    InvalidJourney(String),

    /// Session timer rounds to zero seconds
    #[error("Invalid session timer: {0} minutes")]
    InvalidTimer(f64),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The engine task has exited
    #[error("Playback engine closed")]
    EngineClosed,

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn load(source_id: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::AudioLoad {
            source_id: source_id.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<nocturne_common::Error> for Error {
    fn from(err: nocturne_common::Error) -> Self {
        match err {
            nocturne_common::Error::Io(e) => Error::Io(e),
            nocturne_common::Error::Config(msg) => Error::Config(msg),
            other => Error::InvalidJourney(other.to_string()),
        }
    }
}

/// Convenience Result type using nocturne-ap Error
pub type Result<T> = std::result::Result<T, Error>;
