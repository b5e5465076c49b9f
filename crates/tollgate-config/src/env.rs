//! Environment variable fallbacks.
//!
//! Env vars are **fallback**, not override: they only apply to fields that no
//! config file set. A field still carrying its compiled-in default counts as
//! unset.

use std::collections::HashMap;
use std::hash::BuildHasher;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::merge::{ConfigLayer, FieldSources};

/// How an env var's string value maps onto the TOML tree.
#[derive(Debug, Clone, Copy)]
enum EnvKind {
    Integer,
    Boolean,
    Text,
}

/// Mapping from environment variable name to config field path.
struct EnvMapping {
    var_name: &'static str,
    field_path: &'static str,
    kind: EnvKind,
}

/// All supported `TOLLGATE_*` env var mappings.
const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        var_name: "TOLLGATE_TIMED_WINDOW_SECS",
        field_path: "policy.timed_window_secs",
        kind: EnvKind::Integer,
    },
    EnvMapping {
        var_name: "TOLLGATE_MAX_WINDOW_SECS",
        field_path: "policy.max_window_secs",
        kind: EnvKind::Integer,
    },
    EnvMapping {
        var_name: "TOLLGATE_NOTIFY_ON_AUTO_APPROVE",
        field_path: "policy.notify_on_auto_approve",
        kind: EnvKind::Boolean,
    },
    EnvMapping {
        var_name: "TOLLGATE_SWEEPER_ENABLED",
        field_path: "sweeper.enabled",
        kind: EnvKind::Boolean,
    },
    EnvMapping {
        var_name: "TOLLGATE_SWEEP_INTERVAL_SECS",
        field_path: "sweeper.interval_secs",
        kind: EnvKind::Integer,
    },
    EnvMapping {
        var_name: "TOLLGATE_STORAGE_PATH",
        field_path: "storage.path",
        kind: EnvKind::Text,
    },
    EnvMapping {
        var_name: "TOLLGATE_STORAGE_TIMEOUT_MS",
        field_path: "storage.io_timeout_ms",
        kind: EnvKind::Integer,
    },
    EnvMapping {
        var_name: "TOLLGATE_LOG_LEVEL",
        field_path: "logging.level",
        kind: EnvKind::Text,
    },
    EnvMapping {
        var_name: "TOLLGATE_LOG_FORMAT",
        field_path: "logging.format",
        kind: EnvKind::Text,
    },
];

/// Snapshot the process environment.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(k, _)| k.starts_with("TOLLGATE_"))
        .collect()
}

/// Apply environment variable fallbacks to fields that were **not** set by
/// any config file layer.
///
/// Returns the number of env vars applied.
///
/// # Errors
///
/// Returns [`ConfigError::EnvError`] if a numeric or boolean variable cannot
/// be parsed.
pub fn apply_env_fallbacks<S: BuildHasher>(
    merged: &mut toml::Value,
    sources: &mut FieldSources,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<usize> {
    let mut count: usize = 0;

    for mapping in ENV_MAPPINGS {
        let set_by_file = sources
            .get(mapping.field_path)
            .is_some_and(|layer| *layer != ConfigLayer::Defaults);
        if set_by_file {
            continue;
        }

        let Some(raw) = env_vars.get(mapping.var_name) else {
            continue;
        };

        debug!(
            var = mapping.var_name,
            field = mapping.field_path,
            "applying env var fallback"
        );

        let value = coerce(mapping, raw)?;
        set_field(merged, mapping.field_path, value);
        sources.insert(mapping.field_path.to_owned(), ConfigLayer::Environment);
        count = count.saturating_add(1);
    }

    Ok(count)
}

fn coerce(mapping: &EnvMapping, raw: &str) -> ConfigResult<toml::Value> {
    let raw = raw.trim();
    match mapping.kind {
        EnvKind::Integer => raw
            .parse::<i64>()
            .map(toml::Value::Integer)
            .map_err(|e| ConfigError::EnvError {
                var_name: mapping.var_name.to_owned(),
                message: format!("expected an integer: {e}"),
            }),
        EnvKind::Boolean => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(toml::Value::Boolean(true)),
            "0" | "false" | "no" | "off" => Ok(toml::Value::Boolean(false)),
            other => Err(ConfigError::EnvError {
                var_name: mapping.var_name.to_owned(),
                message: format!("expected a boolean, got '{other}'"),
            }),
        },
        EnvKind::Text => Ok(toml::Value::String(raw.to_owned())),
    }
}

/// Set a dotted field path in the TOML tree, creating intermediate tables.
fn set_field(root: &mut toml::Value, path: &str, value: toml::Value) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(leaf) = segments.pop() else {
        return;
    };

    let mut current = root;
    for segment in segments {
        let Some(table) = current.as_table_mut() else {
            return;
        };
        current = table
            .entry(segment.to_owned())
            .or_insert(toml::Value::Table(toml::map::Map::new()));
    }

    if let Some(table) = current.as_table_mut() {
        table.insert(leaf.to_owned(), value);
    }
}
