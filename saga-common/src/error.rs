//! Error types for the SagaCrush services.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the Saga error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading and validating configuration.
#[derive(Error, Debug)]
pub enum Error {
    /// A setting the service cannot run with
    #[error("Configuration error: {0}")]
    Config(String),

    /// The config file exists but could not be read
    #[error("Failed to read config from {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON for [`crate::Config`]
    #[error("Failed to parse config from {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
