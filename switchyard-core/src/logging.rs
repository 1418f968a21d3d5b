//! Logging setup for switchyard.
//!
//! The dispatcher logs through `tracing`; this module re-exports the macros
//! and provides [`LogConfig`] to install a subscriber. Output defaults to
//! JSON on STDOUT.
//!
//! # Examples
//!
//! ```no_run
//! use switchyard_core::logging::*;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let _guard = LogConfig::new()
//!         .level(LogLevel::Debug)
//!         .format(LogFormat::Pretty)
//!         .init()?;
//!
//!     info!("dispatcher starting");
//!     Ok(())
//! }
//! ```
//!
//! ## Environment
//!
//! [`LogConfig::from_env`] reads:
//!
//! - `SWITCHYARD_LOG_LEVEL`: `trace`, `debug`, `info`, `warn` or `error`
//! - `SWITCHYARD_LOG_FORMAT`: `json`, `plain`, `pretty` or `compact`
//! - `SWITCHYARD_DEBUG`: `1`/`true` forces the debug level
//!
//! ## Rolling files
//!
//! ```no_run
//! use switchyard_core::logging::*;
//!
//! let _guard = LogConfig::new()
//!     .output(LogOutput::RollingFile {
//!         directory: "logs".to_string(),
//!         prefix: "dispatch".to_string(),
//!         rotation: Rotation::Daily,
//!     })
//!     .init();
//! ```

use std::io;
use std::str::FromStr;
use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub use tracing::{debug, error, info, trace, warn};

pub const ENV_LOG_LEVEL: &str = "SWITCHYARD_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "SWITCHYARD_LOG_FORMAT";
pub const ENV_DEBUG: &str = "SWITCHYARD_DEBUG";

/// Log level for filtering messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(&self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    /// Directive string for `EnvFilter`
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

/// Output format for log messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Structured, machine-readable (default)
    Json,
    Plain,
    /// Multi-line, for development
    Pretty,
    Compact,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "plain" | "text" => Ok(LogFormat::Plain),
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

/// Output destination for logs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    File(String),
    RollingFile {
        directory: String,
        prefix: String,
        rotation: Rotation,
    },
}

/// File rotation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Minutely,
    Hourly,
    Daily,
    Never,
}

impl Rotation {
    fn to_tracing_rotation(self) -> tracing_appender::rolling::Rotation {
        match self {
            Rotation::Minutely => tracing_appender::rolling::Rotation::MINUTELY,
            Rotation::Hourly => tracing_appender::rolling::Rotation::HOURLY,
            Rotation::Daily => tracing_appender::rolling::Rotation::DAILY,
            Rotation::Never => tracing_appender::rolling::Rotation::NEVER,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,
    pub thread_ids: bool,
    /// Include target (module path)
    pub targets: bool,
    pub file_line: bool,
    /// Emit span close events with timings, e.g. per-dispatch spans
    pub spans: bool,
    pub colors: bool,
    /// Custom filter directives, e.g. `switchyard_core=trace`; overrides `level`
    pub env_filter: Option<String>,
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by the `SWITCHYARD_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(level) = lookup(ENV_LOG_LEVEL).and_then(|v| v.parse().ok()) {
            config.level = level;
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT).and_then(|v| v.parse().ok()) {
            config.format = format;
        }
        let debug = lookup(ENV_DEBUG)
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false);
        if debug {
            config.level = LogLevel::Debug;
        }
        config
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_thread_ids(mut self, enable: bool) -> Self {
        self.thread_ids = enable;
        self
    }

    pub fn with_targets(mut self, enable: bool) -> Self {
        self.targets = enable;
        self
    }

    pub fn with_file_line(mut self, enable: bool) -> Self {
        self.file_line = enable;
        self
    }

    pub fn with_spans(mut self, enable: bool) -> Self {
        self.spans = enable;
        self
    }

    pub fn with_colors(mut self, enable: bool) -> Self {
        self.colors = enable;
        self
    }

    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Install the global subscriber.
    ///
    /// The returned guard flushes buffered output when dropped; keep it alive
    /// for the life of the process. If a global subscriber is already set the
    /// call is a no-op apart from creating the writer.
    pub fn init(self) -> io::Result<WorkerGuard> {
        let filter = self.build_filter();
        let (writer, guard) = self.make_writer()?;
        let layer = self.build_layer(writer);

        if tracing_subscriber::registry()
            .with(layer)
            .with(filter)
            .try_init()
            .is_err()
        {
            debug!("global tracing subscriber already installed");
        }
        Ok(guard)
    }

    fn build_filter(&self) -> EnvFilter {
        match &self.env_filter {
            Some(directives) => EnvFilter::try_new(directives)
                .unwrap_or_else(|_| EnvFilter::new(self.level.as_str())),
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(self.level.as_str())),
        }
    }

    fn make_writer(&self) -> io::Result<(NonBlocking, WorkerGuard)> {
        Ok(match &self.output {
            LogOutput::Stdout => tracing_appender::non_blocking(io::stdout()),
            LogOutput::Stderr => tracing_appender::non_blocking(io::stderr()),
            LogOutput::File(path) => {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;
                tracing_appender::non_blocking(file)
            }
            LogOutput::RollingFile {
                directory,
                prefix,
                rotation,
            } => tracing_appender::non_blocking(
                tracing_appender::rolling::RollingFileAppender::new(
                    rotation.to_tracing_rotation(),
                    directory,
                    prefix,
                ),
            ),
        })
    }

    fn build_layer(&self, writer: NonBlocking) -> Box<dyn Layer<Registry> + Send + Sync> {
        let span_events = if self.spans {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };
        let base = fmt::layer()
            .with_writer(writer)
            .with_target(self.targets)
            .with_thread_ids(self.thread_ids)
            .with_span_events(span_events);

        match self.format {
            LogFormat::Json => base
                .json()
                .with_current_span(self.spans)
                .with_span_list(self.spans)
                .with_file(self.file_line)
                .with_line_number(self.file_line)
                .boxed(),
            LogFormat::Plain => base
                .with_ansi(self.colors)
                .with_file(self.file_line)
                .with_line_number(self.file_line)
                .boxed(),
            LogFormat::Pretty => base
                .pretty()
                .with_ansi(self.colors)
                .with_file(self.file_line)
                .with_line_number(self.file_line)
                .boxed(),
            LogFormat::Compact => base.compact().with_ansi(self.colors).boxed(),
        }
    }
}

impl Default for LogConfig {
    /// JSON to STDOUT at INFO
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Json,
            output: LogOutput::Stdout,
            thread_ids: false,
            targets: true,
            file_line: false,
            spans: false,
            colors: false,
            env_filter: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_log_level_parse() {
        assert_eq!("TRACE".parse::<LogLevel>(), Ok(LogLevel::Trace));
        assert_eq!("warning".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::Error.to_tracing_level(), Level::ERROR);
    }

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.output, LogOutput::Stdout);
        assert!(config.targets);
    }

    #[test]
    fn test_from_env_values() {
        let vars: HashMap<&str, &str> =
            [(ENV_LOG_LEVEL, "warn"), (ENV_LOG_FORMAT, "compact")].into_iter().collect();
        let config = LogConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.level, LogLevel::Warn);
        assert_eq!(config.format, LogFormat::Compact);
    }

    #[test]
    fn test_debug_flag_overrides_level() {
        let vars: HashMap<&str, &str> =
            [(ENV_LOG_LEVEL, "error"), (ENV_DEBUG, "true")].into_iter().collect();
        let config = LogConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.level, LogLevel::Debug);
    }

    #[test]
    fn test_config_builder() {
        let config = LogConfig::new()
            .level(LogLevel::Debug)
            .format(LogFormat::Pretty)
            .with_colors(true)
            .with_targets(false);

        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(config.colors);
        assert!(!config.targets);
    }
}
