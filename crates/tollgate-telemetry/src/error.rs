//! Telemetry error types.

use thiserror::Error;

/// Errors raised while installing the tracing subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A level, directive or format string was rejected.
    #[error("invalid logging configuration: {0}")]
    ConfigError(String),

    /// The global subscriber could not be installed, usually because one
    /// already is.
    #[error("failed to install log subscriber: {0}")]
    InitError(String),

    /// The log directory could not be created.
    #[error("log directory error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result alias for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
