//! Prelude module - commonly used types for convenient import.
//!
//! Use `use tollgate_runtime::prelude::*;` to import all essential types.

pub use crate::{ApprovalRuntime, RuntimeError, RuntimeResult, init_logging};
