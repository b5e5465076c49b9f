//! Configuration types for the Tollgate runtime.
//!
//! All types in this module are self-contained with no dependencies on other
//! internal tollgate crates. Every struct implements [`Default`] with the same
//! values as the embedded `defaults.toml`, so a bare `[section]` header in
//! TOML produces a working configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration for the Tollgate runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Approval policy knobs (timed window length, notification default).
    pub policy: PolicySection,
    /// Background expiry sweeper.
    pub sweeper: SweeperSection,
    /// Approval record storage.
    pub storage: StorageSection,
    /// Notification bridge sizing.
    pub events: EventsSection,
    /// Logging level, format, and per-crate directives.
    pub logging: LoggingSection,
}

// ---------------------------------------------------------------------------
// PolicySection
// ---------------------------------------------------------------------------

/// Approval policy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySection {
    /// Window granted when a session is switched to the timed mode without an
    /// explicit duration.
    pub timed_window_secs: u64,
    /// Longest window `grant_timed_approval` accepts.
    pub max_window_secs: u64,
    /// Initial `notify_on_auto_approve` flag for newly registered sessions.
    pub notify_on_auto_approve: bool,
}

impl PolicySection {
    /// Default timed window as a [`Duration`].
    #[must_use]
    pub fn timed_window(&self) -> Duration {
        Duration::from_secs(self.timed_window_secs)
    }

    /// Maximum timed window as a [`Duration`].
    #[must_use]
    pub fn max_window(&self) -> Duration {
        Duration::from_secs(self.max_window_secs)
    }
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            timed_window_secs: 10_800,
            max_window_secs: 2_592_000,
            notify_on_auto_approve: true,
        }
    }
}

// ---------------------------------------------------------------------------
// SweeperSection
// ---------------------------------------------------------------------------

/// Expiry sweeper configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperSection {
    /// Run the periodic sweeper. Expiry is still enforced lazily on
    /// evaluation when disabled.
    pub enabled: bool,
    /// Seconds between sweeps.
    pub interval_secs: u64,
}

impl SweeperSection {
    /// Sweep interval as a [`Duration`].
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for SweeperSection {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
        }
    }
}

// ---------------------------------------------------------------------------
// StorageSection
// ---------------------------------------------------------------------------

/// Approval record storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// KV namespace holding one record per session.
    pub namespace: String,
    /// Directory for the durable KV backend. `None` keeps records in memory.
    pub path: Option<PathBuf>,
    /// Per-operation deadline for store reads and writes, in milliseconds.
    pub io_timeout_ms: u64,
}

impl StorageSection {
    /// Store I/O deadline as a [`Duration`].
    #[must_use]
    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            namespace: "system:approval".to_owned(),
            path: None,
            io_timeout_ms: 2_000,
        }
    }
}

// ---------------------------------------------------------------------------
// EventsSection
// ---------------------------------------------------------------------------

/// Notification bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsSection {
    /// Broadcast buffer size. Slow async receivers that fall further behind
    /// than this skip events.
    pub channel_capacity: usize,
}

impl Default for EventsSection {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// Logging and tracing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global log level filter (`"trace"`, `"debug"`, `"info"`, `"warn"`,
    /// `"error"`).
    pub level: String,
    /// Output format: `"pretty"`, `"compact"`, `"json"`, or `"full"`.
    pub format: String,
    /// Per-crate tracing directives (e.g. `["tollgate_approval=debug"]`).
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "pretty".to_owned(),
            directives: Vec::new(),
        }
    }
}
