//! Durable mapping from session id to approval state.

use std::future::Future;
use std::time::Duration;

use tollgate_core::SessionId;
use tollgate_storage::{ScopedKvStore, StorageResult};
use tracing::{debug, warn};

use crate::error::{ApprovalError, ApprovalResult};
use crate::state::{ApprovalRecord, ApprovalState};

/// KV namespace used when the caller does not pick one.
pub const DEFAULT_NAMESPACE: &str = "system:approval";

/// Default deadline for a single store read or write.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(2);

/// Approval records on top of a namespaced KV store.
///
/// Each operation touches one key and is atomic at that granularity; there
/// are no cross-key transactions. Every call is bounded by the I/O deadline
/// and reports [`ApprovalError::StoreUnavailable`] when it runs out.
#[derive(Debug, Clone)]
pub struct ApprovalStore {
    kv: ScopedKvStore,
    io_timeout: Duration,
}

impl ApprovalStore {
    /// Wrap a scoped KV store with the default I/O deadline.
    #[must_use]
    pub fn new(kv: ScopedKvStore) -> Self {
        Self::with_io_timeout(kv, DEFAULT_IO_TIMEOUT)
    }

    /// Wrap a scoped KV store with an explicit I/O deadline.
    #[must_use]
    pub fn with_io_timeout(kv: ScopedKvStore, io_timeout: Duration) -> Self {
        Self { kv, io_timeout }
    }

    /// The per-operation deadline.
    #[must_use]
    pub fn io_timeout(&self) -> Duration {
        self.io_timeout
    }

    /// Read a session's state. `None` when no record exists.
    ///
    /// # Errors
    ///
    /// [`ApprovalError::StoreUnavailable`] on backend failure or timeout,
    /// [`ApprovalError::CorruptRecord`] when the record cannot be decoded.
    pub async fn get(&self, session_id: &SessionId) -> ApprovalResult<Option<ApprovalState>> {
        let record: Option<ApprovalRecord> = self
            .bounded(session_id, "get", self.kv.get_json(session_id.as_str()))
            .await?;
        record.map(|r| r.into_state(session_id)).transpose()
    }

    /// Write a session's state, replacing any existing record.
    ///
    /// # Errors
    ///
    /// [`ApprovalError::StoreUnavailable`] on backend failure or timeout.
    pub async fn put(&self, session_id: &SessionId, state: &ApprovalState) -> ApprovalResult<()> {
        let record = ApprovalRecord::from(state);
        self.bounded(
            session_id,
            "put",
            self.kv.set_json(session_id.as_str(), &record),
        )
        .await?;
        debug!(session_id = %session_id, mode = %state.mode(), "approval record written");
        Ok(())
    }

    /// Delete a session's record. Returns `true` if one existed.
    ///
    /// # Errors
    ///
    /// [`ApprovalError::StoreUnavailable`] on backend failure or timeout.
    pub async fn delete(&self, session_id: &SessionId) -> ApprovalResult<bool> {
        self.bounded(session_id, "delete", self.kv.delete(session_id.as_str()))
            .await
    }

    /// Every session id with a stored record.
    ///
    /// # Errors
    ///
    /// [`ApprovalError::StoreUnavailable`] on backend failure or timeout.
    pub async fn list(&self) -> ApprovalResult<Vec<SessionId>> {
        let keys = tokio::time::timeout(self.io_timeout, self.kv.list_keys())
            .await
            .map_err(|_| self.timed_out("list"))?
            .map_err(|e| ApprovalError::StoreUnavailable(e.to_string()))?;
        Ok(keys.into_iter().map(SessionId::from).collect())
    }

    async fn bounded<T, F>(
        &self,
        session_id: &SessionId,
        op: &'static str,
        fut: F,
    ) -> ApprovalResult<T>
    where
        F: Future<Output = StorageResult<T>>,
    {
        match tokio::time::timeout(self.io_timeout, fut).await {
            Ok(result) => result.map_err(|e| ApprovalError::from_storage(session_id, e)),
            Err(_) => {
                warn!(session_id = %session_id, op, "approval store operation timed out");
                Err(self.timed_out(op))
            },
        }
    }

    fn timed_out(&self, op: &str) -> ApprovalError {
        ApprovalError::StoreUnavailable(format!(
            "{op} timed out after {}ms",
            self.io_timeout.as_millis()
        ))
    }
}
