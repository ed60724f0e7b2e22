//! Runtime Configuration
//!
//! Configuration is per [`Runtime`](crate::reactive::Runtime), so tests can
//! build independent runtimes with different limits.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default circular-update threshold.
pub const DEFAULT_MAX_UPDATE_COUNT: u32 = 100;

/// Tunables for a reactive runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How many times a single watcher may be re-queued within one flush
    /// before the flush is aborted as a circular update.
    pub max_update_count: u32,

    /// Development diagnostics: stabilized notification order and warnings.
    pub diagnostics: bool,

    /// Suppress all warnings.
    pub silent: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_update_count: DEFAULT_MAX_UPDATE_COUNT,
            diagnostics: cfg!(debug_assertions),
            silent: false,
        }
    }
}

impl Config {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_update_count == 0 {
            return Err(ConfigError::ZeroUpdateCount);
        }
        Ok(())
    }

    /// Whether development warnings should be emitted.
    pub fn warnings_enabled(&self) -> bool {
        self.diagnostics && !self.silent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config = Config::from_json(r#"{ "silent": true }"#).unwrap();
        assert_eq!(config.max_update_count, DEFAULT_MAX_UPDATE_COUNT);
        assert!(config.silent);
        assert!(!config.warnings_enabled());
    }

    #[test]
    fn rejects_zero_threshold() {
        let err = Config::from_json(r#"{ "max_update_count": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroUpdateCount));
    }

    #[test]
    fn rejects_malformed_json() {
        let err = Config::from_json("{ max_update_count").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
