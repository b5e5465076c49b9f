//! The policy engine: evaluation and mode changes for paired sessions.
//!
//! All reads and writes of a session's record happen under that session's
//! lock, so operations on one session are linearizable while different
//! sessions proceed independently. Expiry is lazy: whichever operation first
//! observes a lapsed timed window rewrites it to `RequireApproval` and
//! publishes the expiry, before doing anything else.

use std::sync::Arc;
use std::time::Duration;

use tollgate_core::{ApprovalMode, Clock, SessionId, SystemClock, Timestamp};
use tollgate_events::{EventMetadata, NotificationBridge, PolicyEvent};
use tracing::{debug, info, warn};

use crate::error::{ApprovalError, ApprovalResult};
use crate::lock::SessionLocks;
use crate::state::{ApprovalState, ApprovalStatus, Decision, Evaluation};
use crate::store::ApprovalStore;

/// Event source tag for changes made through the engine's API.
pub const ENGINE_SOURCE: &str = "engine";
/// Event source tag for expiries finalized by the background sweeper.
pub const SWEEPER_SOURCE: &str = "sweeper";

/// Tunables for [`PolicyEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Window granted by [`PolicyEngine::grant_default_window`].
    pub default_window: Duration,
    /// Longest window [`PolicyEngine::grant_timed_approval`] accepts.
    pub max_window: Duration,
    /// `notify_on_auto_approve` for newly registered sessions.
    pub notify_on_auto_approve: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_window: Duration::from_secs(10_800),
            max_window: Duration::from_secs(2_592_000),
            notify_on_auto_approve: true,
        }
    }
}

/// Decides whether signing requests for a session are auto-approved.
pub struct PolicyEngine {
    store: ApprovalStore,
    bridge: NotificationBridge,
    clock: Arc<dyn Clock>,
    locks: SessionLocks,
    config: EngineConfig,
}

impl std::fmt::Debug for PolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEngine")
            .field("store", &self.store)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PolicyEngine {
    /// Create an engine reading the system clock.
    #[must_use]
    pub fn new(store: ApprovalStore, bridge: NotificationBridge, config: EngineConfig) -> Self {
        Self {
            store,
            bridge,
            clock: Arc::new(SystemClock),
            locks: SessionLocks::new(),
            config,
        }
    }

    /// Replace the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The engine's tunables.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The bridge events are published on.
    #[must_use]
    pub fn bridge(&self) -> &NotificationBridge {
        &self.bridge
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Create the default record for a newly paired session.
    ///
    /// Idempotent: an existing record is left alone and returned.
    ///
    /// # Errors
    ///
    /// Fails if the store is unavailable or the id is not a valid key.
    pub async fn register_session(&self, session_id: &SessionId) -> ApprovalResult<ApprovalState> {
        let _guard = self.locks.acquire(session_id).await;
        if let Some(existing) = self.store.get(session_id).await? {
            debug!(session_id = %session_id, "session already registered");
            return Ok(existing);
        }

        let state = ApprovalState::require_approval(self.config.notify_on_auto_approve);
        self.store.put(session_id, &state).await?;
        info!(session_id = %session_id, "registered session");
        Ok(state)
    }

    /// Delete a session's record when it is unpaired.
    ///
    /// # Errors
    ///
    /// [`ApprovalError::UnknownSession`] if there was nothing to delete, or a
    /// store error.
    pub async fn revoke_session(&self, session_id: &SessionId) -> ApprovalResult<()> {
        let _guard = self.locks.acquire(session_id).await;
        if !self.store.delete(session_id).await? {
            return Err(unknown(session_id));
        }

        info!(session_id = %session_id, "revoked session");
        self.bridge.publish(PolicyEvent::SessionRevoked {
            metadata: EventMetadata::at(ENGINE_SOURCE, self.clock.now()),
            session_id: session_id.clone(),
        });
        Ok(())
    }

    /// Every session with a stored record.
    ///
    /// # Errors
    ///
    /// Fails if the store is unavailable.
    pub async fn sessions(&self) -> ApprovalResult<Vec<SessionId>> {
        self.store.list().await
    }

    // -----------------------------------------------------------------------
    // Evaluation
    // -----------------------------------------------------------------------

    /// Decide a signing request for `session_id`.
    ///
    /// A lapsed timed window is finalized first. Store failures and corrupt
    /// records answer [`Decision::RequiresInteractiveApproval`] rather than
    /// an error, as does a session lock held past the store I/O deadline.
    ///
    /// # Errors
    ///
    /// [`ApprovalError::UnknownSession`] when the session has no record.
    pub async fn evaluate(&self, session_id: &SessionId) -> ApprovalResult<Decision> {
        self.assess(session_id).await.map(|e| e.decision)
    }

    /// Like [`evaluate`](Self::evaluate), also reporting whether the user
    /// wants to hear about an auto-approval.
    ///
    /// # Errors
    ///
    /// [`ApprovalError::UnknownSession`] when the session has no record.
    pub async fn assess(&self, session_id: &SessionId) -> ApprovalResult<Evaluation> {
        // The holder may be blocked in an event handler; waiting for it is
        // capped like any store read.
        let wait = self.store.io_timeout();
        let Ok(_guard) = tokio::time::timeout(wait, self.locks.acquire(session_id)).await else {
            warn!(
                session_id = %session_id,
                wait_ms = wait.as_millis(),
                "session busy, requiring interactive approval"
            );
            return Ok(Evaluation::fail_safe());
        };
        let now = self.clock.now();

        let state = match self.load_locked(session_id, now, ENGINE_SOURCE).await {
            Ok(state) => state,
            Err(e) if e.is_store_failure() => {
                warn!(
                    session_id = %session_id,
                    error = %e,
                    "approval state unreadable, requiring interactive approval"
                );
                return Ok(Evaluation::fail_safe());
            },
            Err(e) => return Err(e),
        };

        let evaluation = Evaluation::of(&state, now);
        debug!(
            session_id = %session_id,
            mode = %state.mode(),
            decision = %evaluation.decision,
            "evaluated signing request"
        );
        Ok(evaluation)
    }

    /// Time left in the session's auto-approve window. `None` unless the
    /// session is in an unexpired timed window.
    ///
    /// # Errors
    ///
    /// [`ApprovalError::UnknownSession`] or a store error.
    pub async fn remaining_approval_window(
        &self,
        session_id: &SessionId,
    ) -> ApprovalResult<Option<Duration>> {
        let _guard = self.locks.acquire(session_id).await;
        let now = self.clock.now();
        let state = self.load_locked(session_id, now, ENGINE_SOURCE).await?;
        Ok(state.remaining(now))
    }

    /// Mode, remaining window and notification flag, for a settings screen.
    ///
    /// # Errors
    ///
    /// [`ApprovalError::UnknownSession`] or a store error.
    pub async fn status(&self, session_id: &SessionId) -> ApprovalResult<ApprovalStatus> {
        let _guard = self.locks.acquire(session_id).await;
        let now = self.clock.now();
        let state = self.load_locked(session_id, now, ENGINE_SOURCE).await?;
        Ok(state.status(now))
    }

    // -----------------------------------------------------------------------
    // Mutators
    // -----------------------------------------------------------------------

    /// Auto-approve every request, discarding any timed window.
    ///
    /// # Errors
    ///
    /// [`ApprovalError::UnknownSession`] or a store error; on error the
    /// stored state is unchanged.
    pub async fn set_always_approve(&self, session_id: &SessionId) -> ApprovalResult<ApprovalState> {
        self.mutate(session_id, |current, _| {
            Ok(ApprovalState::always_approve(current.notify_on_auto_approve()))
        })
        .await
    }

    /// Require interactive approval for every request, discarding any timed
    /// window.
    ///
    /// # Errors
    ///
    /// [`ApprovalError::UnknownSession`] or a store error; on error the
    /// stored state is unchanged.
    pub async fn set_require_approval(
        &self,
        session_id: &SessionId,
    ) -> ApprovalResult<ApprovalState> {
        self.mutate(session_id, |current, _| {
            Ok(ApprovalState::require_approval(
                current.notify_on_auto_approve(),
            ))
        })
        .await
    }

    /// Auto-approve requests for `duration` from now.
    ///
    /// A second grant replaces the first window; durations never add up. The
    /// deadline is kept in whole seconds, rounded down.
    ///
    /// # Errors
    ///
    /// [`ApprovalError::UnknownSession`] for an absent session whatever the
    /// duration, [`ApprovalError::InvalidWindow`] for a zero or over-long
    /// duration, otherwise as for the other mutators.
    pub async fn grant_timed_approval(
        &self,
        session_id: &SessionId,
        duration: Duration,
    ) -> ApprovalResult<ApprovalState> {
        let max_window = self.config.max_window;
        self.mutate(session_id, |current, now| {
            if duration.as_secs() == 0 {
                return Err(ApprovalError::InvalidWindow(
                    "window must be at least one second".to_owned(),
                ));
            }
            if duration > max_window {
                return Err(ApprovalError::InvalidWindow(format!(
                    "{}s exceeds the {}s maximum",
                    duration.as_secs(),
                    max_window.as_secs()
                )));
            }
            let deadline = window_deadline(now, duration)?;
            Ok(ApprovalState::timed(
                deadline,
                current.notify_on_auto_approve(),
            ))
        })
        .await
    }

    /// Grant the configured default window (three hours unless configured).
    ///
    /// # Errors
    ///
    /// As for [`grant_timed_approval`](Self::grant_timed_approval).
    pub async fn grant_default_window(
        &self,
        session_id: &SessionId,
    ) -> ApprovalResult<ApprovalState> {
        self.grant_timed_approval(session_id, self.config.default_window)
            .await
    }

    /// Set whether auto-approved requests are announced to the user. Does not
    /// touch the mode.
    ///
    /// # Errors
    ///
    /// [`ApprovalError::UnknownSession`] or a store error.
    pub async fn set_notify_on_auto_approve(
        &self,
        session_id: &SessionId,
        enabled: bool,
    ) -> ApprovalResult<ApprovalState> {
        self.mutate(session_id, |current, _| Ok(current.with_notify(enabled)))
            .await
    }

    // -----------------------------------------------------------------------
    // Expiry
    // -----------------------------------------------------------------------

    /// Finalize the session's timed window if it has lapsed. Returns `true`
    /// when a rewrite happened, `false` when there was nothing to do
    /// (including a session revoked in the meantime).
    ///
    /// # Errors
    ///
    /// A store error, in which case the record is left as it was.
    pub async fn expire_if_due(&self, session_id: &SessionId) -> ApprovalResult<bool> {
        let _guard = self.locks.acquire(session_id).await;
        let now = self.clock.now();
        let Some(state) = self.store.get(session_id).await? else {
            return Ok(false);
        };
        if !state.is_expired(now) {
            return Ok(false);
        }
        self.finalize_locked(session_id, state, now, SWEEPER_SOURCE)
            .await?;
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Internals. Callers hold the session lock.
    // -----------------------------------------------------------------------

    /// Read the record, finalizing a lapsed window. When the rewrite fails
    /// the finalized state is still returned, since a lapsed window never
    /// allows anything; the next operation retries the write.
    async fn load_locked(
        &self,
        session_id: &SessionId,
        now: Timestamp,
        source: &str,
    ) -> ApprovalResult<ApprovalState> {
        let state = self
            .store
            .get(session_id)
            .await?
            .ok_or_else(|| unknown(session_id))?;

        if !state.is_expired(now) {
            return Ok(state);
        }

        match self.finalize_locked(session_id, state, now, source).await {
            Ok(finalized) => Ok(finalized),
            Err(e) => {
                warn!(
                    session_id = %session_id,
                    error = %e,
                    "failed to persist expired approval window"
                );
                Ok(state.finalized())
            },
        }
    }

    async fn finalize_locked(
        &self,
        session_id: &SessionId,
        state: ApprovalState,
        now: Timestamp,
        source: &str,
    ) -> ApprovalResult<ApprovalState> {
        let finalized = state.finalized();
        self.store.put(session_id, &finalized).await?;

        info!(
            session_id = %session_id,
            source,
            "timed approval window expired"
        );
        self.bridge.publish(PolicyEvent::ApprovalWindowExpired {
            metadata: EventMetadata::at(source, now),
            session_id: session_id.clone(),
        });
        self.bridge.publish(PolicyEvent::PolicyChanged {
            metadata: EventMetadata::at(source, now),
            session_id: session_id.clone(),
            new_mode: ApprovalMode::RequireApproval,
        });
        Ok(finalized)
    }

    /// Apply `change` to the current state. Writes and publishes only when
    /// the state actually differs.
    async fn mutate<F>(&self, session_id: &SessionId, change: F) -> ApprovalResult<ApprovalState>
    where
        F: FnOnce(ApprovalState, Timestamp) -> ApprovalResult<ApprovalState>,
    {
        let _guard = self.locks.acquire(session_id).await;
        let now = self.clock.now();
        let current = self.load_locked(session_id, now, ENGINE_SOURCE).await?;
        let next = change(current, now)?;

        if next == current {
            debug!(session_id = %session_id, "approval state unchanged");
            return Ok(current);
        }

        self.store.put(session_id, &next).await?;

        if next.mode() != current.mode() || next.expires_at() != current.expires_at() {
            info!(
                session_id = %session_id,
                from = %current.mode(),
                to = %next.mode(),
                expires_at = ?next.expires_at().map(|t| t.to_string()),
                "approval policy changed"
            );
            self.bridge.publish(PolicyEvent::PolicyChanged {
                metadata: EventMetadata::at(ENGINE_SOURCE, now),
                session_id: session_id.clone(),
                new_mode: next.mode(),
            });
        } else {
            debug!(
                session_id = %session_id,
                notify_on_auto_approve = next.notify_on_auto_approve(),
                "auto-approve notification setting changed"
            );
        }
        Ok(next)
    }
}

fn unknown(session_id: &SessionId) -> ApprovalError {
    ApprovalError::UnknownSession {
        session_id: session_id.clone(),
    }
}

/// `now + duration`, both truncated to whole seconds.
fn window_deadline(now: Timestamp, duration: Duration) -> ApprovalResult<Timestamp> {
    let overflow = || ApprovalError::InvalidWindow("deadline is out of range".to_owned());
    let secs = i64::try_from(duration.as_secs()).map_err(|_| overflow())?;
    now.epoch_secs()
        .checked_add(secs)
        .and_then(Timestamp::from_epoch_secs)
        .ok_or_else(overflow)
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
