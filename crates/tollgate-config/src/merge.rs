//! Deep merge of TOML layers with per-field source tracking.
//!
//! The merge operates on raw [`toml::Value`] trees rather than deserialized
//! structs, so a key missing from an overlay never resets the base value.

use std::collections::HashMap;
use std::fmt;

/// Which configuration layer a value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLayer {
    /// Compiled-in defaults (`defaults.toml`).
    Defaults,
    /// User-level configuration (`~/.tollgate/config.toml`).
    User,
    /// File passed explicitly by the embedding application.
    File,
    /// Environment variable fallback.
    Environment,
}

impl fmt::Display for ConfigLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Defaults => write!(f, "defaults"),
            Self::User => write!(f, "user (~/.tollgate/config.toml)"),
            Self::File => write!(f, "explicit config file"),
            Self::Environment => write!(f, "environment variable"),
        }
    }
}

/// Tracks which layer set each field's value.
pub type FieldSources = HashMap<String, ConfigLayer>;

/// Deep-merge `overlay` into `base`, recording which layer set each leaf
/// field. Tables merge per key; scalars and arrays replace.
pub fn deep_merge_tracking(
    base: &mut toml::Value,
    overlay: &toml::Value,
    prefix: &str,
    layer: &ConfigLayer,
    sources: &mut FieldSources,
) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let path = join_path(prefix, key);
                if let Some(base_val) = base_table.get_mut(key) {
                    if overlay_val.is_table() {
                        deep_merge_tracking(base_val, overlay_val, &path, layer, sources);
                    } else {
                        *base_val = overlay_val.clone();
                        sources.insert(path, layer.clone());
                    }
                } else {
                    base_table.insert(key.clone(), overlay_val.clone());
                    record_leaves(overlay_val, &path, layer, sources);
                }
            }
        },
        (base, overlay) => {
            *base = overlay.clone();
            sources.insert(prefix.to_owned(), layer.clone());
        },
    }
}

/// Walk a value tree and record every leaf path as coming from `layer`.
pub fn record_leaves(
    val: &toml::Value,
    prefix: &str,
    layer: &ConfigLayer,
    sources: &mut FieldSources,
) {
    if let toml::Value::Table(table) = val {
        for (key, child) in table {
            record_leaves(child, &join_path(prefix, key), layer, sources);
        }
    } else {
        sources.insert(prefix.to_owned(), layer.clone());
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_owned()
    } else {
        format!("{prefix}.{key}")
    }
}
