//! Event types published by the policy engine.

use serde::{Deserialize, Serialize};
use tollgate_core::{ApprovalMode, SessionId, Timestamp};
use uuid::Uuid;

/// Metadata attached to every event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// When the event was created.
    pub timestamp: Timestamp,
    /// Component that generated the event (`engine`, `sweeper`, ...).
    pub source: String,
}

impl EventMetadata {
    /// Create metadata stamped with the wall-clock time.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self::at(source, Timestamp::now())
    }

    /// Create metadata stamped with an explicit time, usually the engine
    /// clock's notion of "now".
    #[must_use]
    pub fn at(source: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp,
            source: source.into(),
        }
    }
}

/// Policy change notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PolicyEvent {
    /// A session's approval mode changed.
    PolicyChanged {
        /// Event metadata.
        metadata: EventMetadata,
        /// Session whose policy changed.
        session_id: SessionId,
        /// The mode now in effect.
        new_mode: ApprovalMode,
    },

    /// A timed auto-approve window ran out and was finalized.
    ///
    /// Always followed by a [`PolicyEvent::PolicyChanged`] to
    /// `RequireApproval` for the same session.
    ApprovalWindowExpired {
        /// Event metadata.
        metadata: EventMetadata,
        /// Session whose window expired.
        session_id: SessionId,
    },

    /// A session was unpaired and its approval record deleted.
    SessionRevoked {
        /// Event metadata.
        metadata: EventMetadata,
        /// The revoked session.
        session_id: SessionId,
    },
}

impl PolicyEvent {
    /// Stable snake-case name of the event variant.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PolicyChanged { .. } => "policy_changed",
            Self::ApprovalWindowExpired { .. } => "approval_window_expired",
            Self::SessionRevoked { .. } => "session_revoked",
        }
    }

    /// The session this event concerns.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::PolicyChanged { session_id, .. }
            | Self::ApprovalWindowExpired { session_id, .. }
            | Self::SessionRevoked { session_id, .. } => session_id,
        }
    }

    /// The event's metadata.
    #[must_use]
    pub fn metadata(&self) -> &EventMetadata {
        match self {
            Self::PolicyChanged { metadata, .. }
            | Self::ApprovalWindowExpired { metadata, .. }
            | Self::SessionRevoked { metadata, .. } => metadata,
        }
    }
}
