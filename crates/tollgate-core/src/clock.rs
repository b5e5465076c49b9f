//! Time sources.
//!
//! Every expiry decision in Tollgate reads "now" through a [`Clock`] so that
//! tests can drive time explicitly with a [`ManualClock`].

use std::sync::Mutex;
use std::time::Duration;

use crate::types::Timestamp;

/// A source of the current time.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time from the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// A clock that only moves when told to.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tollgate_core::{Clock, ManualClock, Timestamp};
///
/// let clock = ManualClock::new(Timestamp::from_epoch_secs(0).unwrap());
/// clock.advance(Duration::from_secs(60));
/// assert_eq!(clock.now().epoch_secs(), 60);
/// ```
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    #[must_use]
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward by `by`.
    ///
    /// Saturates at the current value if the addition would overflow.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| {
            tracing::warn!("ManualClock lock poisoned, recovering");
            e.into_inner()
        });
        if let Some(next) = now.checked_add(by) {
            *now = next;
        }
    }

    /// Jump to an arbitrary instant, including backwards.
    pub fn set(&self, to: Timestamp) {
        let mut now = self.now.lock().unwrap_or_else(|e| {
            tracing::warn!("ManualClock lock poisoned, recovering");
            e.into_inner()
        });
        *now = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Timestamp::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
