//! Logging configuration and setup.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::{self, MakeWriter, format::FmtSpan};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::error::{TelemetryError, TelemetryResult};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

fn init_err<E: std::fmt::Display>(e: E) -> TelemetryError {
    TelemetryError::InitError(e.to_string())
}

/// File rotation strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileRotation {
    /// Rotate daily.
    #[default]
    Daily,
    /// Rotate hourly.
    Hourly,
    /// Never rotate.
    Never,
}

impl From<FileRotation> for Rotation {
    fn from(rotation: FileRotation) -> Self {
        match rotation {
            FileRotation::Daily => Self::DAILY,
            FileRotation::Hourly => Self::HOURLY,
            FileRotation::Never => Self::NEVER,
        }
    }
}

/// Log format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format with colors (default).
    #[default]
    Pretty,
    /// Compact single-line format.
    Compact,
    /// JSON format for structured logging.
    Json,
    /// Full format with all fields.
    Full,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            "full" => Ok(Self::Full),
            other => Err(TelemetryError::ConfigError(format!(
                "unknown log format '{other}'"
            ))),
        }
    }
}

/// Log output target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    /// Log to stdout.
    Stdout,
    /// Log to stderr.
    #[default]
    Stderr,
    /// Log to rolling files in a directory.
    File(PathBuf),
}

/// File logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLogConfig {
    /// File name prefix (e.g. "tollgate" produces "tollgate.2026-01-15").
    #[serde(default = "default_file_prefix")]
    pub prefix: String,
    /// Rotation strategy.
    #[serde(default)]
    pub rotation: FileRotation,
}

fn default_file_prefix() -> String {
    "tollgate".to_owned()
}

impl Default for FileLogConfig {
    fn default() -> Self {
        Self {
            prefix: default_file_prefix(),
            rotation: FileRotation::default(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct LogConfig {
    /// Log level filter (e.g., "info", "debug", "trace").
    #[serde(default = "default_level")]
    pub level: String,
    /// Log format.
    #[serde(default)]
    pub format: LogFormat,
    /// Log target.
    #[serde(default)]
    pub target: LogTarget,
    /// File logging configuration (used when target is File).
    #[serde(default)]
    pub file: FileLogConfig,
    /// Whether to include timestamps.
    #[serde(default = "default_true")]
    pub timestamps: bool,
    /// Whether to include file/line info.
    #[serde(default)]
    pub file_info: bool,
    /// Whether to include thread IDs.
    #[serde(default)]
    pub thread_ids: bool,
    /// Whether to include span open/close events.
    #[serde(default)]
    pub span_events: bool,
    /// Whether to use ANSI colors.
    #[serde(default = "default_true")]
    pub ansi: bool,
    /// Directive overrides (e.g., `tollgate_approval=debug`).
    #[serde(default)]
    pub directives: Vec<String>,
}

fn default_level() -> String {
    "info".to_owned()
}

fn default_true() -> bool {
    true
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            target: LogTarget::default(),
            file: FileLogConfig::default(),
            timestamps: true,
            file_info: false,
            thread_ids: false,
            span_events: false,
            ansi: true,
            directives: Vec::new(),
        }
    }
}

impl LogConfig {
    /// Create a new log config with the specified level.
    #[must_use]
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Default::default()
        }
    }

    /// Build a log config from the `[logging]` section of the runtime
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::ConfigError`] if the format is unknown.
    #[cfg(feature = "config")]
    pub fn from_section(section: &tollgate_config::LoggingSection) -> TelemetryResult<Self> {
        Ok(Self {
            level: section.level.clone(),
            format: section.format.parse()?,
            directives: section.directives.clone(),
            ..Default::default()
        })
    }

    /// Set the log format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the log target.
    #[must_use]
    pub fn with_target(mut self, target: LogTarget) -> Self {
        self.target = target;
        self
    }

    /// Log to rolling files under `directory`.
    #[must_use]
    pub fn with_file_logging(
        mut self,
        directory: impl Into<PathBuf>,
        prefix: impl Into<String>,
        rotation: FileRotation,
    ) -> Self {
        self.target = LogTarget::File(directory.into());
        self.file.prefix = prefix.into();
        self.file.rotation = rotation;
        // No escape codes in files.
        self.ansi = false;
        self
    }

    /// Add a directive override.
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// Disable timestamps.
    #[must_use]
    pub fn without_timestamps(mut self) -> Self {
        self.timestamps = false;
        self
    }

    /// Enable file/line info.
    #[must_use]
    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    /// Enable span events.
    #[must_use]
    pub fn with_span_events(mut self) -> Self {
        self.span_events = true;
        self
    }

    /// Disable ANSI colors.
    #[must_use]
    pub fn without_ansi(mut self) -> Self {
        self.ansi = false;
        self
    }

    fn build_filter(&self) -> TelemetryResult<EnvFilter> {
        let mut filter = EnvFilter::try_new(&self.level)
            .map_err(|e| TelemetryError::ConfigError(e.to_string()))?;

        for directive in &self.directives {
            filter = filter.add_directive(directive.parse().map_err(
                |e: tracing_subscriber::filter::ParseError| {
                    TelemetryError::ConfigError(e.to_string())
                },
            )?);
        }

        Ok(filter)
    }

    fn span_events(&self) -> FmtSpan {
        if self.span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }

    fn build_layer<W>(&self, writer: W) -> BoxedLayer
    where
        W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        let base = fmt::layer()
            .with_writer(writer)
            .with_ansi(self.ansi)
            .with_file(self.file_info)
            .with_line_number(self.file_info)
            .with_thread_ids(self.thread_ids)
            .with_span_events(self.span_events());

        match (self.format, self.timestamps) {
            (LogFormat::Json, true) => base.json().boxed(),
            (LogFormat::Json, false) => base.json().without_time().boxed(),
            (LogFormat::Pretty, true) => base.pretty().boxed(),
            (LogFormat::Pretty, false) => base.pretty().without_time().boxed(),
            (LogFormat::Compact, true) => base.compact().boxed(),
            (LogFormat::Compact, false) => base.compact().without_time().boxed(),
            (LogFormat::Full, true) => base.boxed(),
            (LogFormat::Full, false) => base.without_time().boxed(),
        }
    }
}

/// Set up logging with the given configuration.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the log directory cannot
/// be created, or a global subscriber is already installed.
pub fn setup_logging(config: &LogConfig) -> TelemetryResult<()> {
    let filter = config.build_filter()?;

    let layer = match &config.target {
        LogTarget::Stdout => config.build_layer(std::io::stdout),
        LogTarget::Stderr => config.build_layer(std::io::stderr),
        LogTarget::File(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender =
                RollingFileAppender::new(config.file.rotation.into(), dir, &config.file.prefix);
            config.build_layer(appender)
        },
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
        .map_err(init_err)
}

/// Set up default logging (info level, stderr, pretty format).
///
/// # Errors
///
/// Returns an error if logging cannot be initialized.
pub fn setup_default_logging() -> TelemetryResult<()> {
    setup_logging(&LogConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.target, LogTarget::Stderr);
        assert!(config.timestamps);
        assert!(config.ansi);
    }

    #[test]
    fn test_log_config_builder() {
        let config = LogConfig::new("debug")
            .with_format(LogFormat::Json)
            .without_timestamps()
            .with_file_info()
            .with_directive("tollgate_approval=trace");

        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Json);
        assert!(!config.timestamps);
        assert!(config.file_info);
        assert_eq!(config.directives, vec!["tollgate_approval=trace"]);
    }

    #[test]
    fn test_file_logging_disables_ansi() {
        let config = LogConfig::new("info").with_file_logging("/tmp/logs", "gate", FileRotation::Hourly);
        assert_eq!(config.target, LogTarget::File(PathBuf::from("/tmp/logs")));
        assert_eq!(config.file.prefix, "gate");
        assert_eq!(config.file.rotation, FileRotation::Hourly);
        assert!(!config.ansi);
    }

    #[test]
    fn test_log_config_deserializes_with_defaults() {
        let parsed: LogConfig =
            serde_json::from_str(r#"{"level":"warn","format":"compact"}"#).unwrap();
        assert_eq!(parsed.level, "warn");
        assert_eq!(parsed.format, LogFormat::Compact);
        assert!(parsed.timestamps);
        assert_eq!(parsed.file, FileLogConfig::default());
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("full".parse::<LogFormat>().unwrap(), LogFormat::Full);
        assert!(matches!(
            "xml".parse::<LogFormat>(),
            Err(TelemetryError::ConfigError(_))
        ));
    }

    #[test]
    fn test_build_filter() {
        let config = LogConfig::new("debug").with_directive("tollgate=trace");
        assert!(config.build_filter().is_ok());
    }

    #[test]
    fn test_build_filter_invalid() {
        // EnvFilter is permissive with unknown targets, so test invalid syntax.
        let config = LogConfig::new("debug").with_directive("[invalid=syntax");
        assert!(config.build_filter().is_err());
    }

    #[test]
    fn test_second_init_fails() {
        let config = LogConfig::new("warn").with_format(LogFormat::Compact);
        // The first call may or may not win the global slot.
        let _ = setup_logging(&config);
        assert!(matches!(
            setup_logging(&config),
            Err(TelemetryError::InitError(_))
        ));
    }

    #[test]
    fn test_file_target_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested").join("logs");
        let config = LogConfig::new("info").with_file_logging(&dir, "gate", FileRotation::Never);

        let _ = setup_logging(&config);
        assert!(dir.is_dir());
    }

    #[cfg(feature = "config")]
    #[test]
    fn test_from_section() {
        let section = tollgate_config::LoggingSection {
            level: "debug".to_owned(),
            format: "json".to_owned(),
            directives: vec!["tollgate_events=trace".to_owned()],
        };
        let config = LogConfig::from_section(&section).unwrap();
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.directives, vec!["tollgate_events=trace"]);
    }
}
