//! Tollgate Core - Foundation types for the Tollgate session approval engine.
//!
//! This crate provides:
//! - [`SessionId`], the opaque identifier of a paired session
//! - [`ApprovalMode`], the per-session approval policy
//! - [`Timestamp`], a UTC instant with epoch-second persistence helpers
//! - The [`Clock`] trait with a system clock and a manual clock for tests
//! - [`format_duration`] for compact human-readable durations

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod clock;
pub mod humanize;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use humanize::format_duration;
pub use types::{ApprovalMode, SessionId, Timestamp};
