#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Layered configuration for the Tollgate approval runtime.
//!
//! # Usage
//!
//! ```rust,no_run
//! use tollgate_config::Config;
//!
//! // defaults → ~/.tollgate/config.toml → explicit file → TOLLGATE_* fallbacks
//! let resolved = Config::load(None).unwrap();
//! println!("timed window: {:?}", resolved.config.policy.timed_window());
//! ```
//!
//! # Configuration Precedence
//!
//! From highest to lowest priority:
//!
//! 1. **Explicit file** passed to [`Config::load`]
//! 2. **User** (`~/.tollgate/config.toml`)
//! 3. **Environment variables** (`TOLLGATE_*`), fallback only
//! 4. **Embedded defaults** (`defaults.toml` compiled into the binary)
//!
//! This crate has no dependencies on other internal tollgate crates.
//! Conversion to domain types happens where the runtime is assembled.

/// Environment variable fallback resolution.
pub mod env;
/// Configuration error types.
pub mod error;
/// Configuration file discovery and loading.
pub mod loader;
/// Layered configuration merging with source tracking.
pub mod merge;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

use std::path::Path;

pub use error::{ConfigError, ConfigResult};
pub use loader::ResolvedConfig;
pub use merge::{ConfigLayer, FieldSources};
pub use types::*;

impl Config {
    /// Load configuration with the full precedence chain.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any layer is malformed or the merged
    /// result fails validation.
    pub fn load(config_file: Option<&Path>) -> ConfigResult<ResolvedConfig> {
        loader::load(config_file, None)
    }

    /// Load a single config file with no layering.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read, parsed, or
    /// validated.
    pub fn load_file(path: &Path) -> ConfigResult<Self> {
        loader::load_file(path)
    }

    /// Validate this configuration.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure.
    pub fn validate(&self) -> ConfigResult<()> {
        validate::validate(self)
    }
}
