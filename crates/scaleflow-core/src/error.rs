//! Error types for ScaleFlow configuration loading.

use thiserror::Error;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur while loading or validating cluster defaults.
///
/// These surface only at startup / config-reload time. The decision path
/// itself never fails: malformed per-target overrides fall back to the
/// cluster defaults and malformed samples are dropped.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read defaults file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse defaults file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid defaults: {0}")]
    Invalid(String),
}
