//! Tollgate Storage - key-value persistence for approval records.
//!
//! The [`KvStore`] trait is the minimal durable contract the policy engine
//! needs: byte-level `get`/`set`/`delete` scoped to a namespace, plus key
//! listing for the expiry sweeper. Writes replace a key's value atomically;
//! there are no cross-key transactions.
//!
//! # Backends
//!
//! - [`MemoryKvStore`] (always available): tests and ephemeral deployments
//! - `SurrealKvStore` (behind the **`kv`** feature): embedded, ACID-compliant
//!   LSM-tree storage on disk
//!
//! [`ScopedKvStore`] pre-binds a namespace and adds JSON helpers.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod kv;

pub use error::{StorageError, StorageResult};
pub use kv::{KvStore, MemoryKvStore, ScopedKvStore};

#[cfg(feature = "kv")]
pub use kv::SurrealKvStore;
