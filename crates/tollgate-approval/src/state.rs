//! Per-session approval state, decisions, and the persisted record format.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tollgate_core::{ApprovalMode, SessionId, Timestamp, format_duration};

use crate::error::{ApprovalError, ApprovalResult};

/// Approval policy of one session.
///
/// `expires_at` is present exactly when the mode is
/// [`ApprovalMode::TimedAutoApprove`]; the constructors are the only way to
/// build a state, so the pairing cannot drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalState {
    mode: ApprovalMode,
    expires_at: Option<Timestamp>,
    notify_on_auto_approve: bool,
}

impl ApprovalState {
    /// Every request needs an interactive approval.
    #[must_use]
    pub fn require_approval(notify_on_auto_approve: bool) -> Self {
        Self {
            mode: ApprovalMode::RequireApproval,
            expires_at: None,
            notify_on_auto_approve,
        }
    }

    /// Every request is auto-approved.
    #[must_use]
    pub fn always_approve(notify_on_auto_approve: bool) -> Self {
        Self {
            mode: ApprovalMode::AlwaysApprove,
            expires_at: None,
            notify_on_auto_approve,
        }
    }

    /// Requests are auto-approved strictly before `expires_at`.
    #[must_use]
    pub fn timed(expires_at: Timestamp, notify_on_auto_approve: bool) -> Self {
        Self {
            mode: ApprovalMode::TimedAutoApprove,
            expires_at: Some(expires_at),
            notify_on_auto_approve,
        }
    }

    /// The stored mode, which may be a timed window that has already lapsed.
    /// Use [`effective_mode`](Self::effective_mode) for the mode in force.
    #[must_use]
    pub fn mode(&self) -> ApprovalMode {
        self.mode
    }

    /// Deadline of the timed window, if any.
    #[must_use]
    pub fn expires_at(&self) -> Option<Timestamp> {
        self.expires_at
    }

    /// Whether auto-approved requests should be surfaced to the user.
    #[must_use]
    pub fn notify_on_auto_approve(&self) -> bool {
        self.notify_on_auto_approve
    }

    /// Same state with a different notification flag.
    #[must_use]
    pub fn with_notify(self, notify_on_auto_approve: bool) -> Self {
        Self {
            notify_on_auto_approve,
            ..self
        }
    }

    /// A timed window whose deadline is at or before `now`.
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }

    /// The mode in force at `now`. A lapsed window counts as
    /// [`ApprovalMode::RequireApproval`] whether or not it was rewritten.
    #[must_use]
    pub fn effective_mode(&self, now: Timestamp) -> ApprovalMode {
        if self.is_expired(now) {
            ApprovalMode::RequireApproval
        } else {
            self.mode
        }
    }

    /// Time left in an unexpired timed window.
    #[must_use]
    pub fn remaining(&self, now: Timestamp) -> Option<Duration> {
        let deadline = self.expires_at?;
        if now >= deadline {
            return None;
        }
        deadline.duration_since(now)
    }

    /// The decision for a request arriving at `now`.
    ///
    /// Never [`Decision::Deny`]: rejection is a human answer to an
    /// interactive prompt, not a policy outcome.
    #[must_use]
    pub fn decide(&self, now: Timestamp) -> Decision {
        match self.effective_mode(now) {
            ApprovalMode::AlwaysApprove | ApprovalMode::TimedAutoApprove => Decision::Allow,
            ApprovalMode::RequireApproval => Decision::RequiresInteractiveApproval,
        }
    }

    /// The state a lapsed window is rewritten to.
    #[must_use]
    pub fn finalized(self) -> Self {
        Self::require_approval(self.notify_on_auto_approve)
    }

    /// Snapshot for display at `now`.
    #[must_use]
    pub fn status(&self, now: Timestamp) -> ApprovalStatus {
        ApprovalStatus {
            mode: self.effective_mode(now),
            remaining: self.remaining(now),
            notify_on_auto_approve: self.notify_on_auto_approve,
        }
    }
}

/// Outcome of evaluating a signing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Sign without asking.
    Allow,
    /// Refuse. Reserved for callers recording a human rejection; the engine's
    /// own policy never produces it.
    Deny,
    /// Ask the user.
    RequiresInteractiveApproval,
}

impl Decision {
    /// Whether the request may proceed without a prompt.
    #[must_use]
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allow)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::Deny => write!(f, "deny"),
            Self::RequiresInteractiveApproval => write!(f, "requires_interactive_approval"),
        }
    }
}

/// A decision together with whether the user asked to hear about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    /// The decision.
    pub decision: Decision,
    /// `true` when the request was auto-approved and the session has
    /// `notify_on_auto_approve` set.
    pub notify_user: bool,
}

impl Evaluation {
    pub(crate) fn fail_safe() -> Self {
        Self {
            decision: Decision::RequiresInteractiveApproval,
            notify_user: false,
        }
    }

    pub(crate) fn of(state: &ApprovalState, now: Timestamp) -> Self {
        let decision = state.decide(now);
        Self {
            decision,
            notify_user: decision.is_allowed() && state.notify_on_auto_approve,
        }
    }
}

/// What a settings screen shows for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalStatus {
    /// Mode in force, with lazy expiry applied.
    pub mode: ApprovalMode,
    /// Time left when `mode` is a timed window.
    pub remaining: Option<Duration>,
    /// Whether auto-approved requests are announced.
    pub notify_on_auto_approve: bool,
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.mode, self.remaining) {
            (ApprovalMode::AlwaysApprove, _) => write!(f, "always approve"),
            (ApprovalMode::TimedAutoApprove, Some(left)) => {
                write!(f, "don't ask for {}", format_duration(left))
            },
            (ApprovalMode::TimedAutoApprove, None) | (ApprovalMode::RequireApproval, _) => {
                write!(f, "ask every time")
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Persisted record
// ---------------------------------------------------------------------------

/// On-disk shape of an [`ApprovalState`], JSON-encoded in the KV value.
///
/// `expires_at` is whole seconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ApprovalRecord {
    pub(crate) mode: u8,
    pub(crate) expires_at: Option<i64>,
    pub(crate) notify_on_auto_approve: bool,
}

impl From<&ApprovalState> for ApprovalRecord {
    fn from(state: &ApprovalState) -> Self {
        Self {
            mode: state.mode.code(),
            expires_at: state.expires_at.map(|t| t.epoch_secs()),
            notify_on_auto_approve: state.notify_on_auto_approve,
        }
    }
}

impl ApprovalRecord {
    /// Decode and check the mode/expiry pairing.
    pub(crate) fn into_state(self, session_id: &SessionId) -> ApprovalResult<ApprovalState> {
        let corrupt = |reason: String| ApprovalError::CorruptRecord {
            session_id: session_id.clone(),
            reason,
        };

        let mode = ApprovalMode::from_code(self.mode)
            .ok_or_else(|| corrupt(format!("unknown mode code {}", self.mode)))?;

        match (mode, self.expires_at) {
            (ApprovalMode::TimedAutoApprove, Some(secs)) => {
                let deadline = Timestamp::from_epoch_secs(secs)
                    .ok_or_else(|| corrupt(format!("expiry {secs} out of range")))?;
                Ok(ApprovalState::timed(deadline, self.notify_on_auto_approve))
            },
            (ApprovalMode::TimedAutoApprove, None) => {
                Err(corrupt("timed mode without an expiry".to_owned()))
            },
            (_, Some(_)) => Err(corrupt(format!("{mode} must not carry an expiry"))),
            (ApprovalMode::AlwaysApprove, None) => {
                Ok(ApprovalState::always_approve(self.notify_on_auto_approve))
            },
            (ApprovalMode::RequireApproval, None) => {
                Ok(ApprovalState::require_approval(self.notify_on_auto_approve))
            },
        }
    }
}
