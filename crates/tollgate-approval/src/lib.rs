//! Tollgate Approval - per-session signing approval policy.
//!
//! Every signing request tied to a paired session is answered with one of
//! three [`Decision`]s: sign automatically, ask the user, or (for callers
//! recording a human answer) refuse.
//!
//! # Components
//!
//! - [`ApprovalStore`]: durable `SessionId → ApprovalState` records on top
//!   of a namespaced KV store, with bounded I/O
//! - [`PolicyEngine`]: evaluation plus the mode mutators, linearizable per
//!   session and lazily finalizing lapsed timed windows
//! - [`ExpirySweeper`]: background task that finalizes lapsed windows so
//!   observers hear about them promptly
//! - [`AccessLog`]: read contract for the request log, used for the
//!   last-active display
//!
//! Policy changes are published on a
//! [`NotificationBridge`](tollgate_events::NotificationBridge).
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tollgate_approval::{ApprovalStore, Decision, EngineConfig, PolicyEngine};
//! use tollgate_core::SessionId;
//! use tollgate_events::NotificationBridge;
//! use tollgate_storage::{MemoryKvStore, ScopedKvStore};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let kv = ScopedKvStore::new(Arc::new(MemoryKvStore::new()), "system:approval")?;
//! let engine = PolicyEngine::new(
//!     ApprovalStore::new(kv),
//!     NotificationBridge::new(),
//!     EngineConfig::default(),
//! );
//!
//! let phone = SessionId::new("phone-1");
//! engine.register_session(&phone).await?;
//! assert_eq!(engine.evaluate(&phone).await?, Decision::RequiresInteractiveApproval);
//!
//! engine.grant_timed_approval(&phone, Duration::from_secs(3 * 60 * 60)).await?;
//! assert_eq!(engine.evaluate(&phone).await?, Decision::Allow);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod access_log;
pub mod engine;
/// Error types and results for the approval module.
pub mod error;
pub mod state;
pub mod store;
pub mod sweeper;

mod lock;

pub use access_log::{AccessLog, AccessOutcome, LogEntry, MemoryAccessLog, last_active};
pub use engine::{EngineConfig, PolicyEngine};
pub use error::{ApprovalError, ApprovalResult};
pub use state::{ApprovalState, ApprovalStatus, Decision, Evaluation};
pub use store::ApprovalStore;
pub use sweeper::{ExpirySweeper, SweepReport};
