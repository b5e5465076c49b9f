//! Validation of a fully merged [`Config`].

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Longest store I/O deadline accepted, in milliseconds.
const MAX_IO_TIMEOUT_MS: u64 = 60_000;

/// Validate a merged configuration.
///
/// # Errors
///
/// Returns the first [`ConfigError::ValidationError`] encountered.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_policy(config)?;
    validate_sweeper(config)?;
    validate_storage(config)?;
    validate_events(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn validate_policy(config: &Config) -> ConfigResult<()> {
    let policy = &config.policy;
    if policy.timed_window_secs == 0 {
        return Err(invalid("policy.timed_window_secs", "must be greater than zero"));
    }
    if policy.max_window_secs == 0 {
        return Err(invalid("policy.max_window_secs", "must be greater than zero"));
    }
    if policy.timed_window_secs > policy.max_window_secs {
        return Err(invalid(
            "policy.timed_window_secs",
            format!(
                "{} exceeds policy.max_window_secs ({})",
                policy.timed_window_secs, policy.max_window_secs
            ),
        ));
    }
    // Expiry instants are stored as i64 epoch seconds.
    if i64::try_from(policy.max_window_secs).is_err() {
        return Err(invalid("policy.max_window_secs", "value is too large"));
    }
    Ok(())
}

fn validate_sweeper(config: &Config) -> ConfigResult<()> {
    if config.sweeper.interval_secs == 0 {
        return Err(invalid("sweeper.interval_secs", "must be at least 1"));
    }
    Ok(())
}

fn validate_storage(config: &Config) -> ConfigResult<()> {
    let storage = &config.storage;
    if storage.namespace.is_empty() || storage.namespace.contains('\0') {
        return Err(invalid(
            "storage.namespace",
            "must be non-empty and must not contain null bytes",
        ));
    }
    if storage.io_timeout_ms == 0 || storage.io_timeout_ms > MAX_IO_TIMEOUT_MS {
        return Err(invalid(
            "storage.io_timeout_ms",
            format!("must be between 1 and {MAX_IO_TIMEOUT_MS}"),
        ));
    }
    if storage
        .path
        .as_ref()
        .is_some_and(|p| p.as_os_str().is_empty())
    {
        return Err(invalid("storage.path", "must not be empty when set"));
    }
    Ok(())
}

fn validate_events(config: &Config) -> ConfigResult<()> {
    if config.events.channel_capacity == 0 {
        return Err(invalid("events.channel_capacity", "must be at least 1"));
    }
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.logging.level.as_str()) {
        return Err(invalid(
            "logging.level",
            format!(
                "unsupported log level '{}'; expected one of: {}",
                config.logging.level,
                valid_levels.join(", ")
            ),
        ));
    }

    let valid_formats = ["pretty", "compact", "json", "full"];
    if !valid_formats.contains(&config.logging.format.as_str()) {
        return Err(invalid(
            "logging.format",
            format!(
                "unsupported log format '{}'; expected one of: {}",
                config.logging.format,
                valid_formats.join(", ")
            ),
        ));
    }

    Ok(())
}
