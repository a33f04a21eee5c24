//! Error types for configuration handling.

use thiserror::Error;

/// Errors raised while loading or persisting the hub configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read or written.
    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The config file contains invalid JSON.
    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// No home directory could be resolved for the default config path.
    #[error("No home directory available for the hub config file")]
    NoHomeDir,
}
