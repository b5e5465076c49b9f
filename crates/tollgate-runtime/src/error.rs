//! Runtime assembly errors.

use thiserror::Error;
use tollgate_config::ConfigError;
use tollgate_storage::StorageError;
use tollgate_telemetry::TelemetryError;

/// Errors raised while starting or stopping the runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The KV backend could not be opened.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Logging could not be initialized.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    /// `storage.path` is set but this build has no durable backend.
    #[error("durable storage at {0} requires the `kv` feature")]
    DurableStorageUnavailable(String),

    /// Called outside a Tokio runtime while the sweeper is enabled.
    #[error("the expiry sweeper needs a Tokio runtime")]
    NoRuntime,

    /// The sweeper task panicked or was aborted.
    #[error("expiry sweeper task failed: {0}")]
    SweeperFailed(String),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
