//! Runtime Configuration
//!
//! Configuration for the storage-area runtime. Values can be set
//! programmatically through the builder or loaded from environment
//! variables. The configuration only affects diagnostics; the storage
//! semantics themselves are not configurable.
//!
//! # Environment Variables
//!
//! All variables use the `LSA_` prefix:
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `LSA_LOG_LEVEL` | Log level (off/error/warn/info/debug/trace) | info |
//! | `LSA_LOG_FORMAT` | Log output format (plain/json) | plain |
//! | `LSA_LOG_ENABLED` | Enable logging ("true"/"false") | true |
//!
//! # Example
//!
//! ```rust,ignore
//! use lsa_runtime::config::Config;
//!
//! // Load from environment with defaults for anything unset.
//! let config = Config::from_env();
//!
//! // Or use the builder.
//! let config = Config::builder()
//!     .log_level(lsa_runtime::log::Level::Debug)
//!     .build();
//! ```

use std::env;
use std::fmt;

use crate::log::{Format, Level};

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Minimum log level.
    pub log_level: Level,
    /// Log output format.
    pub log_format: Format,
    /// Master logging switch.
    pub log_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Level::default(),
            log_format: Format::default(),
            log_enabled: true,
        }
    }
}

impl Config {
    /// Start building a configuration from defaults.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load configuration from `LSA_*` environment variables.
    ///
    /// Unset variables fall back to defaults; malformed values are
    /// ignored with a warning on stderr rather than failing startup.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(value) = env::var("LSA_LOG_LEVEL") {
            match Level::parse(&value) {
                Some(level) => config.log_level = level,
                None => eprintln!("lsa-runtime: ignoring invalid LSA_LOG_LEVEL={:?}", value),
            }
        }
        if let Ok(value) = env::var("LSA_LOG_FORMAT") {
            match Format::parse(&value) {
                Some(format) => config.log_format = format,
                None => eprintln!("lsa-runtime: ignoring invalid LSA_LOG_FORMAT={:?}", value),
            }
        }
        if let Ok(value) = env::var("LSA_LOG_ENABLED") {
            match parse_bool(&value) {
                Some(enabled) => config.log_enabled = enabled,
                None => eprintln!("lsa-runtime: ignoring invalid LSA_LOG_ENABLED={:?}", value),
            }
        }
        config
    }

    /// Validate and apply this configuration to the global logger.
    pub fn apply(&self) {
        crate::log::set_level(self.log_level);
        crate::log::set_format(self.log_format);
        crate::log::set_enabled(self.log_enabled);
    }
}

/// Parse a boolean from common spellings.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Builder for [`Config`].
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    log_level: Level,
    log_format: Format,
    log_enabled: bool,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        let base = Config::default();
        Self {
            log_level: base.log_level,
            log_format: base.log_format,
            log_enabled: base.log_enabled,
        }
    }
}

impl ConfigBuilder {
    /// Set the minimum log level.
    pub fn log_level(mut self, level: Level) -> Self {
        self.log_level = level;
        self
    }

    /// Set the log output format.
    pub fn log_format(mut self, format: Format) -> Self {
        self.log_format = format;
        self
    }

    /// Enable or disable logging.
    pub fn log_enabled(mut self, enabled: bool) -> Self {
        self.log_enabled = enabled;
        self
    }

    /// Finish building.
    pub fn build(self) -> Config {
        Config {
            log_level: self.log_level,
            log_format: self.log_format,
            log_enabled: self.log_enabled,
        }
    }
}

/// Error parsing an explicit configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A level string was not recognized.
    InvalidLevel(String),
    /// A format string was not recognized.
    InvalidFormat(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidLevel(s) => write!(f, "invalid log level: {:?}", s),
            ConfigError::InvalidFormat(s) => write!(f, "invalid log format: {:?}", s),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parse an explicit level string, for callers that want hard failures
/// instead of the lenient `from_env` fallback.
pub fn parse_level(s: &str) -> Result<Level, ConfigError> {
    Level::parse(s).ok_or_else(|| ConfigError::InvalidLevel(s.to_string()))
}

/// Parse an explicit format string.
pub fn parse_format(s: &str) -> Result<Format, ConfigError> {
    Format::parse(s).ok_or_else(|| ConfigError::InvalidFormat(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = Config::builder().build();
        assert_eq!(config.log_level, Level::Info);
        assert_eq!(config.log_format, Format::Plain);
        assert!(config.log_enabled);
    }

    #[test]
    fn test_builder_overrides() {
        let config = Config::builder()
            .log_level(Level::Trace)
            .log_format(Format::Json)
            .log_enabled(false)
            .build();
        assert_eq!(config.log_level, Level::Trace);
        assert_eq!(config.log_format, Format::Json);
        assert!(!config.log_enabled);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_parse_level_strict() {
        assert_eq!(parse_level("debug"), Ok(Level::Debug));
        assert!(matches!(parse_level("loud"), Err(ConfigError::InvalidLevel(_))));
    }

    #[test]
    fn test_parse_format_strict() {
        assert_eq!(parse_format("json"), Ok(Format::Json));
        assert!(matches!(parse_format("yaml"), Err(ConfigError::InvalidFormat(_))));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidLevel("loud".into());
        assert!(err.to_string().contains("loud"));
    }
}
