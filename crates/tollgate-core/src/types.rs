//! Common types used throughout Tollgate.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Opaque identifier of a paired session.
///
/// Owned by the pairing subsystem. Tollgate only reads it, never mutates it,
/// and uses it verbatim as the storage key for the session's approval record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap an identifier issued by the pairing subsystem.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Approval policy of a session.
///
/// The persisted discriminants follow the order of the approval settings
/// control (ask, timed, off) and must not be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    /// Every request needs an interactive approval.
    RequireApproval,
    /// Requests are auto-approved until the window's deadline.
    TimedAutoApprove,
    /// Requests are always auto-approved.
    AlwaysApprove,
}

impl ApprovalMode {
    /// The stable one-byte code used in persisted records.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::RequireApproval => 0,
            Self::TimedAutoApprove => 1,
            Self::AlwaysApprove => 2,
        }
    }

    /// Decode a persisted mode code.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::RequireApproval),
            1 => Some(Self::TimedAutoApprove),
            2 => Some(Self::AlwaysApprove),
            _ => None,
        }
    }
}

impl fmt::Display for ApprovalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequireApproval => write!(f, "require_approval"),
            Self::TimedAutoApprove => write!(f, "timed_auto_approve"),
            Self::AlwaysApprove => write!(f, "always_approve"),
        }
    }
}

/// Timestamp wrapper for consistent handling throughout Tollgate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub DateTime<Utc>);

impl Timestamp {
    /// Get the current wall-clock timestamp.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create a timestamp from a `DateTime<Utc>`.
    #[must_use]
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Create a timestamp from whole seconds since the Unix epoch.
    ///
    /// Returns `None` if the value is outside the representable range.
    #[must_use]
    pub fn from_epoch_secs(secs: i64) -> Option<Self> {
        DateTime::<Utc>::from_timestamp(secs, 0).map(Self)
    }

    /// Create a timestamp from milliseconds since the Unix epoch.
    ///
    /// Returns `None` if the value is outside the representable range.
    #[must_use]
    pub fn from_epoch_millis(millis: i64) -> Option<Self> {
        DateTime::<Utc>::from_timestamp_millis(millis).map(Self)
    }

    /// Whole seconds since the Unix epoch, rounded toward negative infinity.
    #[must_use]
    pub fn epoch_secs(&self) -> i64 {
        self.0.timestamp()
    }

    /// Add a duration, returning `None` on overflow.
    #[must_use]
    pub fn checked_add(&self, duration: Duration) -> Option<Self> {
        let delta = TimeDelta::from_std(duration).ok()?;
        self.0.checked_add_signed(delta).map(Self)
    }

    /// Time elapsed from `earlier` to `self`.
    ///
    /// Returns `None` when `earlier` is after `self`.
    #[must_use]
    pub fn duration_since(&self, earlier: Timestamp) -> Option<Duration> {
        self.0.signed_duration_since(earlier.0).to_std().ok()
    }

    /// Get the inner `DateTime<Utc>`.
    #[must_use]
    pub fn into_inner(self) -> DateTime<Utc> {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%dT%H:%M:%SZ"))
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}
