//! Background finalization of lapsed timed windows.
//!
//! The sweeper only keeps stored state and observers fresh; evaluation
//! enforces expiry on its own. Each session is finalized under its own lock,
//! so cancelling between sessions never leaves a record half-written, and a
//! restarted sweeper simply finds nothing left to do for sessions already
//! finalized.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::PolicyEngine;
use crate::error::ApprovalError;

/// Default time between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Shortest interval accepted; `tokio::time::interval` rejects zero.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Outcome of one pass over the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Sessions examined.
    pub scanned: usize,
    /// Sessions whose window was finalized.
    pub finalized: usize,
    /// Sessions that could not be read or rewritten.
    pub failed: usize,
    /// The pass stopped early because cancellation was requested.
    pub cancelled: bool,
}

/// Periodically finalizes expired timed windows.
#[derive(Debug, Clone)]
pub struct ExpirySweeper {
    engine: Arc<PolicyEngine>,
    interval: Duration,
}

impl ExpirySweeper {
    /// Sweep `engine`'s sessions every `interval`.
    #[must_use]
    pub fn new(engine: Arc<PolicyEngine>, interval: Duration) -> Self {
        Self {
            engine,
            interval: interval.max(MIN_SWEEP_INTERVAL),
        }
    }

    /// Time between sweeps.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one pass, checking `cancel` before each session.
    pub async fn sweep_once(&self, cancel: &CancellationToken) -> SweepReport {
        let mut report = SweepReport::default();

        let sessions = match self.engine.sessions().await {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!(error = %e, "expiry sweep could not list sessions");
                report.failed = 1;
                return report;
            },
        };

        for session_id in sessions {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            report.scanned = report.scanned.saturating_add(1);

            match self.engine.expire_if_due(&session_id).await {
                Ok(true) => report.finalized = report.finalized.saturating_add(1),
                Ok(false) => {},
                // Revoked between listing and locking.
                Err(ApprovalError::UnknownSession { .. }) => {},
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "failed to finalize expired window");
                    report.failed = report.failed.saturating_add(1);
                },
            }
        }

        report
    }

    /// Sweep until `cancel` fires. The first pass runs immediately.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = self.interval.as_millis(), "expiry sweeper started");

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.sweep_once(&cancel).await;
                    if report.finalized > 0 || report.failed > 0 {
                        info!(
                            scanned = report.scanned,
                            finalized = report.finalized,
                            failed = report.failed,
                            "expiry sweep complete"
                        );
                    } else {
                        debug!(scanned = report.scanned, "expiry sweep complete");
                    }
                },
            }
        }

        info!("expiry sweeper stopped");
    }

    /// Run on a background task.
    #[must_use]
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}
