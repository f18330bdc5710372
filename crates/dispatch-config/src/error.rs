//! Configuration errors.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The file extension is not one of yaml, yml, toml or json
    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    /// The file could not be parsed
    #[error("Failed to parse config: {0}")]
    Parse(String),

    /// An environment override had an invalid value
    #[error("Invalid value for {var}: {message}")]
    Environment {
        /// Variable name
        var: String,
        /// What was wrong
        message: String,
    },

    /// The merged configuration failed validation
    #[error("Invalid configuration: {0}")]
    Validation(#[from] validator::ValidationErrors),
}
