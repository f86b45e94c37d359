//! Runtime Configuration
//!
//! The only knob is log verbosity. It is read from `CALCWEAVER_LOG_LEVEL`
//! or from JSON, and applied by [`init_tracing`].

use serde::Deserialize;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log level.
pub const LOG_LEVEL_ENV: &str = "CALCWEAVER_LOG_LEVEL";

/// Verbosity of the engine's logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    #[serde(alias = "warning")]
    Warn,
    Error,
}

impl LogLevel {
    /// Parse a level name. Unknown names fall back to `Info`.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "debug" => LogLevel::Debug,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Logging settings applied by [`init_tracing`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub log_level: LogLevel,
}

impl RuntimeConfig {
    /// Read settings from the environment.
    pub fn from_env() -> Self {
        let log_level = std::env::var(LOG_LEVEL_ENV)
            .map(|name| LogLevel::parse(&name))
            .unwrap_or_default();
        Self { log_level }
    }

    /// Parse settings from a JSON document. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Filter directive for this crate's logs.
    pub fn filter_directive(&self) -> String {
        format!("calcweaver_core={}", self.log_level.as_str())
    }
}

/// Install a global `tracing` subscriber writing to stderr.
///
/// `RUST_LOG` takes precedence over the configured level. Returns `false` if
/// a global subscriber was already installed.
pub fn init_tracing(config: &RuntimeConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directive()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_known_levels() {
        assert_eq!(LogLevel::parse("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::parse("WARNING"), LogLevel::Warn);
        assert_eq!(LogLevel::parse(" error "), LogLevel::Error);
    }

    #[test]
    fn unknown_levels_fall_back_to_info() {
        assert_eq!(LogLevel::parse("verbose"), LogLevel::Info);
        assert_eq!(LogLevel::parse(""), LogLevel::Info);
    }

    #[test]
    fn json_config() {
        let config = RuntimeConfig::from_json(r#"{"log_level": "warning"}"#).unwrap();
        assert_eq!(config.log_level, LogLevel::Warn);

        let config = RuntimeConfig::from_json("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());

        assert!(RuntimeConfig::from_json(r#"{"log_level": "loud"}"#).is_err());
    }

    #[test]
    fn filter_directive_targets_this_crate() {
        let config = RuntimeConfig {
            log_level: LogLevel::Debug,
        };
        assert_eq!(config.filter_directive(), "calcweaver_core=debug");
    }
}
