//! Config file discovery and layered loading.
//!
//! `Config::load()` resolves configuration in this order:
//! 1. Parse the embedded `defaults.toml` as the base
//! 2. Merge `~/.tollgate/config.toml` (user)
//! 3. Merge the explicit config file, if one was given
//! 4. Apply `TOLLGATE_*` env var fallbacks for fields no file set
//! 5. Deserialize the merged tree into [`Config`]
//! 6. Validate

use std::collections::HashMap;
use std::hash::BuildHasher;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::env::{apply_env_fallbacks, collect_env_vars};
use crate::error::{ConfigError, ConfigResult};
use crate::merge::{ConfigLayer, FieldSources, deep_merge_tracking, record_leaves};
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Maximum allowed config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// A resolved configuration together with source annotations.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The final merged configuration.
    pub config: Config,
    /// Dotted field path → which layer set the value.
    pub field_sources: FieldSources,
    /// Config file paths that were loaded, lowest precedence first.
    pub loaded_files: Vec<String>,
}

/// Load configuration with the full precedence chain, reading the process
/// environment for fallbacks.
///
/// `config_file` is an explicit file that takes precedence over the user
/// config. `home_override` replaces `~/.tollgate` as the directory searched
/// for the user-level `config.toml`.
///
/// # Errors
///
/// Returns a [`ConfigError`] if any config file is malformed, or if the
/// final merged configuration fails validation.
pub fn load(
    config_file: Option<&Path>,
    home_override: Option<&Path>,
) -> ConfigResult<ResolvedConfig> {
    load_with_env(config_file, home_override, &collect_env_vars())
}

/// Same as [`load`] with an explicit environment snapshot.
///
/// # Errors
///
/// See [`load`].
pub fn load_with_env<S: BuildHasher>(
    config_file: Option<&Path>,
    home_override: Option<&Path>,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<ResolvedConfig> {
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;

    let mut field_sources = FieldSources::new();
    let mut loaded_files = Vec::new();
    record_leaves(&merged, "", &ConfigLayer::Defaults, &mut field_sources);

    // User config.
    let tollgate_home = match home_override {
        Some(h) => h.to_path_buf(),
        None => home_directory()?.join(".tollgate"),
    };
    let user_path = tollgate_home.join("config.toml");
    if let Some(overlay) = try_load_file(&user_path)? {
        deep_merge_tracking(
            &mut merged,
            &overlay,
            "",
            &ConfigLayer::User,
            &mut field_sources,
        );
        loaded_files.push(user_path.display().to_string());
        info!(path = %user_path.display(), "loaded user config");
    }

    // Explicit file. Unlike the user config, a missing file is an error.
    if let Some(path) = config_file {
        let overlay = try_load_file(path)?.ok_or_else(|| ConfigError::ReadError {
            path: path.display().to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        })?;
        deep_merge_tracking(
            &mut merged,
            &overlay,
            "",
            &ConfigLayer::File,
            &mut field_sources,
        );
        loaded_files.push(path.display().to_string());
        info!(path = %path.display(), "loaded config file");
    }

    let env_count = apply_env_fallbacks(&mut merged, &mut field_sources, env_vars)?;
    if env_count > 0 {
        debug!(count = env_count, "applied environment variable fallbacks");
    }

    let config: Config =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: "<merged config>".to_owned(),
                source: e,
            })?;

    validate::validate(&config)?;

    Ok(ResolvedConfig {
        config,
        field_sources,
        loaded_files,
    })
}

/// Load a config from a specific file path (no layering, no env fallbacks).
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read, parsed, or
/// validated.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let value = try_load_file(path)?.ok_or_else(|| ConfigError::ReadError {
        path: path.display().to_string(),
        source: std::io::Error::from(std::io::ErrorKind::NotFound),
    })?;

    let config: Config = value
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::ParseError {
            path: path.display().to_string(),
            source: e,
        })?;

    validate::validate(&config)?;
    Ok(config)
}

/// Try to load a file, returning `None` if the file doesn't exist.
///
/// Uses a single read so there is no window between a metadata check and the
/// read itself.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };

    if content.len() as u64 > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {} byte limit",
                content.len(),
                MAX_CONFIG_FILE_SIZE
            ),
        });
    }

    let value: toml::Value = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(Some(value))
}

/// Determine the user's home directory.
fn home_directory() -> ConfigResult<PathBuf> {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .ok_or(ConfigError::NoHomeDir)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn no_env() -> HashMap<String, String> {
        HashMap::new()
    }

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn defaults_match_default_impl() {
        let parsed: Config = toml::from_str(DEFAULTS_TOML).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn load_with_no_files_uses_defaults() {
        let home = tempfile::tempdir().unwrap();
        let resolved = load_with_env(None, Some(home.path()), &no_env()).unwrap();

        assert_eq!(resolved.config, Config::default());
        assert!(resolved.loaded_files.is_empty());
        assert_eq!(
            resolved.field_sources.get("policy.timed_window_secs"),
            Some(&ConfigLayer::Defaults)
        );
    }

    #[test]
    fn explicit_file_beats_user_file() {
        let home = tempfile::tempdir().unwrap();
        write(
            home.path(),
            "config.toml",
            "[policy]\ntimed_window_secs = 600\n[sweeper]\ninterval_secs = 5\n",
        );
        let other = tempfile::tempdir().unwrap();
        let explicit = write(other.path(), "tollgate.toml", "[policy]\ntimed_window_secs = 1200\n");

        let resolved = load_with_env(Some(&explicit), Some(home.path()), &no_env()).unwrap();

        assert_eq!(resolved.config.policy.timed_window_secs, 1200);
        assert_eq!(resolved.config.sweeper.interval_secs, 5);
        assert_eq!(resolved.loaded_files.len(), 2);
        assert_eq!(
            resolved.field_sources.get("sweeper.interval_secs"),
            Some(&ConfigLayer::User)
        );
        assert_eq!(
            resolved.field_sources.get("policy.timed_window_secs"),
            Some(&ConfigLayer::File)
        );
    }

    #[test]
    fn env_fills_fields_files_left_unset() {
        let home = tempfile::tempdir().unwrap();
        write(home.path(), "config.toml", "[logging]\nlevel = \"warn\"\n");
        let env: HashMap<String, String> = [
            ("TOLLGATE_LOG_LEVEL".to_owned(), "trace".to_owned()),
            ("TOLLGATE_STORAGE_TIMEOUT_MS".to_owned(), "250".to_owned()),
        ]
        .into_iter()
        .collect();

        let resolved = load_with_env(None, Some(home.path()), &env).unwrap();

        assert_eq!(resolved.config.logging.level, "warn");
        assert_eq!(resolved.config.storage.io_timeout_ms, 250);
    }

    #[test]
    fn invalid_merged_config_is_rejected() {
        let home = tempfile::tempdir().unwrap();
        write(home.path(), "config.toml", "[sweeper]\ninterval_secs = 0\n");

        let err = load_with_env(None, Some(home.path()), &no_env()).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn malformed_toml_reports_path() {
        let home = tempfile::tempdir().unwrap();
        let path = write(home.path(), "config.toml", "[policy\n");

        let err = load_with_env(None, Some(home.path()), &no_env()).unwrap_err();
        match err {
            ConfigError::ParseError { path: p, .. } => assert_eq!(p, path.display().to_string()),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let home = tempfile::tempdir().unwrap();
        let missing = home.path().join("nope.toml");

        let err = load_with_env(Some(&missing), Some(home.path()), &no_env()).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }

    #[test]
    fn load_file_skips_layering() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "config.toml",
            "[storage]\npath = \"/var/lib/tollgate\"\n",
        );

        let config = load_file(&path).unwrap();
        assert_eq!(
            config.storage.path.as_deref(),
            Some(Path::new("/var/lib/tollgate"))
        );
        assert_eq!(config.policy, crate::types::PolicySection::default());
    }

    #[test]
    fn oversized_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let body = format!("# {}\n", "x".repeat(1_048_577));
        let path = write(dir.path(), "config.toml", &body);

        let err = load_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }
}
