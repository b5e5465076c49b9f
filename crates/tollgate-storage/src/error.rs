//! Storage error types.

/// Errors raised by a [`KvStore`](crate::KvStore) backend or the scoped view.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backend failed while reading or committing.
    #[error("kv backend error: {0}")]
    Internal(String),

    /// The backend could not be opened, or refused the operation outright.
    #[error("kv backend unreachable: {0}")]
    Connection(String),

    /// A stored value is not valid JSON for the requested type, or a value
    /// could not be encoded.
    #[error("kv value encoding error: {0}")]
    Serialization(String),

    /// The namespace or key is empty or contains a null byte.
    #[error("invalid kv key: {0}")]
    InvalidKey(String),
}

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
