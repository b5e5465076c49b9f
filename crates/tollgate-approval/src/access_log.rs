//! Read contract for the signing access log.
//!
//! The log itself belongs to the signing subsystem, which appends an entry
//! per handled request. The approval side only reads it, to show when a
//! session was last active.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tollgate_core::{SessionId, Timestamp};

use crate::error::ApprovalResult;

/// How a logged request was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessOutcome {
    /// Signed without a prompt.
    AutoApproved,
    /// Signed after the user approved it.
    UserApproved,
    /// The user rejected it.
    Rejected,
}

/// One handled request. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Session the request came from.
    pub session_id: SessionId,
    /// When it was handled.
    pub timestamp: Timestamp,
    /// How it was handled.
    pub outcome: AccessOutcome,
}

/// Read access to the per-session request log.
#[async_trait]
pub trait AccessLog: Send + Sync {
    /// Entries for a session, newest first.
    async fn entries(&self, session_id: &SessionId) -> ApprovalResult<Vec<LogEntry>>;

    /// The most recent entry for a session.
    async fn latest(&self, session_id: &SessionId) -> ApprovalResult<Option<LogEntry>> {
        Ok(self.entries(session_id).await?.into_iter().next())
    }
}

/// When the session last did anything: its newest log entry, or the pairing
/// time if it has none.
///
/// # Errors
///
/// Propagates the log's read error.
pub async fn last_active(
    log: &dyn AccessLog,
    session_id: &SessionId,
    paired_at: Timestamp,
) -> ApprovalResult<Timestamp> {
    Ok(log
        .latest(session_id)
        .await?
        .map_or(paired_at, |entry| entry.timestamp))
}

/// In-memory [`AccessLog`] for tests and single-process hosts.
#[derive(Debug, Default)]
pub struct MemoryAccessLog {
    entries: RwLock<HashMap<SessionId, Vec<LogEntry>>>,
}

impl MemoryAccessLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an entry. Entries may arrive out of order; reads are always
    /// newest first.
    pub fn append(&self, entry: LogEntry) {
        let mut map = self.entries.write().unwrap_or_else(|e| {
            tracing::warn!("MemoryAccessLog lock poisoned, recovering");
            e.into_inner()
        });
        let list = map.entry(entry.session_id.clone()).or_default();
        // Kept sorted newest first; equal timestamps keep arrival order.
        let at = list.partition_point(|e| e.timestamp >= entry.timestamp);
        list.insert(at, entry);
    }

    /// Drop every entry for a session. Returns how many were removed.
    pub fn clear_session(&self, session_id: &SessionId) -> usize {
        let mut map = self.entries.write().unwrap_or_else(|e| {
            tracing::warn!("MemoryAccessLog lock poisoned, recovering");
            e.into_inner()
        });
        map.remove(session_id).map_or(0, |list| list.len())
    }
}

#[async_trait]
impl AccessLog for MemoryAccessLog {
    async fn entries(&self, session_id: &SessionId) -> ApprovalResult<Vec<LogEntry>> {
        let map = self.entries.read().unwrap_or_else(|e| {
            tracing::warn!("MemoryAccessLog lock poisoned, recovering");
            e.into_inner()
        });
        Ok(map.get(session_id).cloned().unwrap_or_default())
    }
}
