//! Per-session async locks.
//!
//! Every read-modify-write of a session's record runs under that session's
//! lock; different sessions never contend. Entries are created on demand and
//! removed when the last holder or waiter lets go, so revoked sessions do not
//! leak locks.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tollgate_core::SessionId;

#[derive(Debug, Default)]
pub(crate) struct SessionLocks {
    locks: DashMap<SessionId, Arc<Mutex<()>>>,
}

impl SessionLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `session_id`. Waiters are served in
    /// arrival order.
    ///
    /// Cancelling the returned future still releases the waiter's hold on
    /// the entry.
    pub(crate) async fn acquire(&self, session_id: &SessionId) -> SessionGuard<'_> {
        // Declared before the lock handle so it drops after it, including
        // when this future is dropped mid-await.
        let entry = EntryHold {
            locks: self,
            session_id: session_id.clone(),
        };
        let lock = Arc::clone(self.locks.entry(session_id.clone()).or_default().value());
        let guard = lock.lock_owned().await;
        SessionGuard {
            _guard: guard,
            _entry: entry,
        }
    }

    /// Number of sessions with a live lock entry.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.len()
    }
}

/// Exclusive access to one session. Dropping it releases the lock.
pub(crate) struct SessionGuard<'a> {
    // Field order matters: the mutex guard drops before the entry hold.
    _guard: OwnedMutexGuard<()>,
    _entry: EntryHold<'a>,
}

/// Removes the session's entry once nobody else references it.
struct EntryHold<'a> {
    locks: &'a SessionLocks,
    session_id: SessionId,
}

impl Drop for EntryHold<'_> {
    fn drop(&mut self) {
        self.locks
            .locks
            .remove_if(&self.session_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
