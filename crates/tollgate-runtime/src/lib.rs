//! Tollgate Runtime - assembles the approval engine from configuration.
//!
//! ```rust,no_run
//! use tollgate_config::Config;
//! use tollgate_core::SessionId;
//! use tollgate_runtime::{ApprovalRuntime, init_logging};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load(None)?.config;
//! init_logging(&config)?;
//!
//! let runtime = ApprovalRuntime::open(&config)?;
//! let decision = runtime.engine().evaluate(&SessionId::new("phone-1")).await;
//! println!("{decision:?}");
//! runtime.shutdown().await?;
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

mod error;
mod runtime;

pub use error::{RuntimeError, RuntimeResult};
pub use runtime::{ApprovalRuntime, engine_config, open_kv};

use tollgate_config::Config;
use tollgate_telemetry::{LogConfig, setup_logging};

/// Install the global tracing subscriber from the `[logging]` section.
///
/// # Errors
///
/// Fails on an unknown format or invalid directive, or if a subscriber is
/// already installed.
pub fn init_logging(config: &Config) -> RuntimeResult<()> {
    setup_logging(&LogConfig::from_section(&config.logging)?)?;
    Ok(())
}
