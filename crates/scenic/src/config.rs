//! Engine configuration parsed from environment variables.
//!
//! Settings can be overridden with variables prefixed with `SCENIC_`.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

/// Environment variable holding the log level.
pub const LOG_LEVEL_VAR: &str = "SCENIC_LOG_LEVEL";
/// Environment variable holding the report directory.
pub const REPORT_DIR_VAR: &str = "SCENIC_REPORT_DIR";

/// Errors raised while reading configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A variable held a value that could not be parsed.
    #[error("invalid value '{value}' for {name}: expected {expected}")]
    InvalidValue {
        /// Variable or option name.
        name: &'static str,
        /// Rejected value.
        value: String,
        /// Description of accepted values.
        expected: &'static str,
    },
}

/// Log level enumeration matching tracing levels.
///
/// Defaults to `Info` when not specified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Most verbose logging, including every span.
    Trace,
    /// Per-step start markers and probe retries.
    Debug,
    /// Phase, step and scenario outcome lines.
    #[default]
    Info,
    /// Failures and teardown problems.
    Warn,
    /// Fixture corruption only.
    Error,
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(ConfigError::InvalidValue {
                name: LOG_LEVEL_VAR,
                value: s.to_owned(),
                expected: "one of: trace, debug, info, warn, error",
            }),
        }
    }
}

impl LogLevel {
    /// Convert to a tracing filter directive string.
    #[must_use]
    pub fn as_filter_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Configuration for the scenario engine.
///
/// # Environment Variables
///
/// - `SCENIC_LOG_LEVEL`: trace, debug, info, warn or error
/// - `SCENIC_REPORT_DIR`: directory receiving JUnit and JSON reports
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Log level.
    pub log_level: LogLevel,
    /// Where [`persist_reports`](Self::persist_reports) writes; `None` disables it.
    pub report_dir: Option<PathBuf>,
}

impl EngineConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when a variable holds an invalid
    /// value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through a variable lookup function.
    ///
    /// # Examples
    ///
    /// ```
    /// use scenic::config::{EngineConfig, LogLevel};
    ///
    /// let config = EngineConfig::from_lookup(|name| {
    ///     (name == "SCENIC_LOG_LEVEL").then(|| "debug".to_owned())
    /// })
    /// .unwrap();
    /// assert_eq!(config.log_level, LogLevel::Debug);
    /// assert!(config.report_dir.is_none());
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when a variable holds an invalid
    /// value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let log_level = lookup(LOG_LEVEL_VAR)
            .map(|value| value.parse::<LogLevel>())
            .transpose()?
            .unwrap_or_default();
        let report_dir = lookup(REPORT_DIR_VAR)
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);
        Ok(Self {
            log_level,
            report_dir,
        })
    }

    /// Apply optional overrides, typically from a command line.
    #[must_use]
    pub fn apply_overrides(mut self, log_level: Option<LogLevel>, report_dir: Option<PathBuf>) -> Self {
        if let Some(level) = log_level {
            self.log_level = level;
        }
        if let Some(dir) = report_dir {
            self.report_dir = Some(dir);
        }
        self
    }

    /// Create a new configuration with the specified log level.
    #[must_use]
    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Create a new configuration writing reports into `dir`.
    #[must_use]
    pub fn with_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.report_dir = Some(dir.into());
        self
    }

    /// Write the collected reports when a report directory is configured.
    ///
    /// Nothing writes reports implicitly; call this once the scenarios of a
    /// session have run, for example from a session-end hook. Each call
    /// rewrites the files with everything collected so far.
    ///
    /// Returns `Ok(false)` when no directory is configured.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError`](crate::reporting::ReportError) when writing
    /// fails.
    pub fn persist_reports(&self) -> Result<bool, crate::reporting::ReportError> {
        self.report_dir
            .as_deref()
            .map_or(Ok(false), |dir| crate::reporting::persist(dir).map(|()| true))
    }
}
