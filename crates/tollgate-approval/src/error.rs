use tollgate_core::SessionId;
use tollgate_storage::StorageError;

/// Errors raised by the approval store and policy engine.
#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    /// No approval record exists for the session. Callers treat this as a
    /// no-op; the session was never paired or has been revoked.
    #[error("unknown session: {session_id}")]
    UnknownSession {
        /// The session that was looked up.
        session_id: SessionId,
    },

    /// The session id cannot be used as a storage key.
    #[error("invalid session id: {0}")]
    InvalidSessionId(String),

    /// The backing store failed or did not answer within the I/O deadline.
    #[error("approval store unavailable: {0}")]
    StoreUnavailable(String),

    /// A stored record could not be decoded or breaks the record invariants.
    #[error("corrupt approval record for session {session_id}: {reason}")]
    CorruptRecord {
        /// Session whose record is unreadable.
        session_id: SessionId,
        /// What was wrong with it.
        reason: String,
    },

    /// A requested auto-approve window is empty, too long, or not
    /// representable.
    #[error("invalid approval window: {0}")]
    InvalidWindow(String),
}

impl ApprovalError {
    /// Whether the error came from the store rather than from the request.
    ///
    /// `evaluate` answers these with an interactive-approval decision instead
    /// of failing.
    #[must_use]
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_) | Self::CorruptRecord { .. }
        )
    }

    pub(crate) fn from_storage(session_id: &SessionId, err: StorageError) -> Self {
        match err {
            StorageError::InvalidKey(msg) => Self::InvalidSessionId(msg),
            StorageError::Serialization(reason) => Self::CorruptRecord {
                session_id: session_id.clone(),
                reason,
            },
            other => Self::StoreUnavailable(other.to_string()),
        }
    }
}

/// Result type for approval operations.
pub type ApprovalResult<T> = Result<T, ApprovalError>;
