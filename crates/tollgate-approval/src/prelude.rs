//! Prelude module - commonly used types for convenient import.
//!
//! Use `use tollgate_approval::prelude::*;` to import all essential types.

// Errors
pub use crate::{ApprovalError, ApprovalResult};

// State and decisions
pub use crate::{ApprovalState, ApprovalStatus, Decision, Evaluation};

// Engine and store
pub use crate::{ApprovalStore, EngineConfig, PolicyEngine};

// Background expiry
pub use crate::{ExpirySweeper, SweepReport};

// Access log
pub use crate::{AccessLog, AccessOutcome, LogEntry, MemoryAccessLog, last_active};
