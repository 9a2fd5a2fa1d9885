//! Common error types for Nocturne

use thiserror::Error;

/// Common result type for Nocturne operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the Nocturne crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed JSON or TOML document
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid user input or catalog record
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Parse(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Parse(err.to_string())
    }
}
