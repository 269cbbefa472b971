//! Logging configuration and subscriber setup.
//!
//! Settings are layered: the `logging` section of roost.json, then the
//! environment (`ROOST_LOG`, falling back to `RUST_LOG`, and
//! `ROOST_LOG_FORMAT`), then explicit overrides from the host application.
//! Output always goes to stderr.

use std::fmt;
use std::io::IsTerminal;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as tfmt, EnvFilter, Layer, Registry};

pub const ENV_LOG_LEVEL: &str = "ROOST_LOG";
pub const ENV_LOG_FORMAT: &str = "ROOST_LOG_FORMAT";

/// Crates whose events pass the default filter.
const LOG_TARGETS: [&str; 3] = ["roost_core", "roost_config", "roost_sink"];

/// How events are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Human,
    /// One JSON object per event.
    Jsonl,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Human => "human",
            LogFormat::Jsonl => "jsonl",
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "human" | "pretty" | "text" => Ok(LogFormat::Human),
            "jsonl" | "json" => Ok(LogFormat::Jsonl),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minimum severity that is emitted, from most to least verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    const ALL: [LogLevel; 6] = [
        LogLevel::Trace,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
        LogLevel::Off,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }

    /// Most verbose level named anywhere in a `RUST_LOG`-style directive
    /// string such as `warn,roost_core=debug`.
    pub fn from_directives(directives: &str) -> Option<Self> {
        directives
            .split(',')
            .filter_map(|d| d.rsplit('=').next())
            .filter_map(|token| token.parse::<LogLevel>().ok())
            .min()
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        let alias = match s.as_str() {
            "warning" => "warn",
            "none" | "quiet" => "off",
            other => other,
        };
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == alias)
            .ok_or_else(|| format!("unknown log level '{}'", s))
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Resolved logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: LogLevel,
    /// Prefix human-readable lines with a timestamp.
    pub timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            format: LogFormat::default(),
            level: LogLevel::default(),
            timestamps: true,
        }
    }
}

impl LogConfig {
    /// Defaults, then environment, then explicit overrides.
    pub fn from_env(level: Option<LogLevel>, format: Option<LogFormat>) -> Self {
        Self::resolve(LogConfig::default(), level, format)
    }

    /// Layer the environment and then explicit overrides over `base`.
    ///
    /// Unparseable environment values are ignored.
    pub fn resolve(base: LogConfig, level: Option<LogLevel>, format: Option<LogFormat>) -> Self {
        let env_level = match std::env::var(ENV_LOG_LEVEL) {
            Ok(value) => value.parse().ok(),
            Err(_) => std::env::var("RUST_LOG")
                .ok()
                .and_then(|value| LogLevel::from_directives(&value)),
        };
        let env_format = std::env::var(ENV_LOG_FORMAT)
            .ok()
            .and_then(|value| value.parse().ok());

        LogConfig {
            level: level.or(env_level).unwrap_or(base.level),
            format: format.or(env_format).unwrap_or(base.format),
            ..base
        }
    }

    pub fn with_format(self, format: LogFormat) -> Self {
        LogConfig { format, ..self }
    }

    pub fn with_level(self, level: LogLevel) -> Self {
        LogConfig { level, ..self }
    }

    pub fn with_timestamps(self, timestamps: bool) -> Self {
        LogConfig { timestamps, ..self }
    }

    /// `EnvFilter` directives enabling every roost crate at this level.
    pub fn filter_directives(&self) -> String {
        LOG_TARGETS
            .iter()
            .map(|target| format!("{}={}", target, self.level))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn output_layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        match (self.format, self.timestamps) {
            (LogFormat::Jsonl, _) => tfmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(false)
                .boxed(),
            (LogFormat::Human, true) => tfmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(std::io::stderr().is_terminal())
                .with_target(false)
                .boxed(),
            (LogFormat::Human, false) => tfmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(std::io::stderr().is_terminal())
                .with_target(false)
                .without_time()
                .boxed(),
        }
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` directives, when set, replace the computed filter. Returns
/// false when a subscriber is already installed; that one stays in place.
pub fn init_logging(config: &LogConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directives()));

    tracing_subscriber::registry()
        .with(config.output_layer())
        .with(filter)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Jsonl);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Human);
        assert!("xml".parse::<LogFormat>().is_err());

        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!(" Quiet ".parse::<LogLevel>().unwrap(), LogLevel::Off);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_level_from_directives() {
        assert_eq!(
            LogLevel::from_directives("warn,roost_core=debug"),
            Some(LogLevel::Debug)
        );
        assert_eq!(LogLevel::from_directives("error"), Some(LogLevel::Error));
        assert_eq!(LogLevel::from_directives("roost_core"), None);
    }

    #[test]
    fn test_explicit_overrides_win() {
        let config = LogConfig::resolve(
            LogConfig::default().with_level(LogLevel::Warn),
            Some(LogLevel::Debug),
            Some(LogFormat::Jsonl),
        );
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Jsonl);
        assert!(config.timestamps);
    }

    #[test]
    fn test_filter_directives() {
        let config = LogConfig::default().with_level(LogLevel::Debug);
        assert_eq!(
            config.filter_directives(),
            "roost_core=debug,roost_config=debug,roost_sink=debug"
        );
    }

    #[test]
    fn test_init_is_idempotent() {
        let config = LogConfig::default()
            .with_level(LogLevel::Off)
            .with_timestamps(false);
        init_logging(&config);
        assert!(!init_logging(&config));
    }
}
