use crate::settings::{Settings, SettingsError};
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use thiserror::Error;
use tracing::Level;

/// Tool configuration, separate from the device settings it manages.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub settings_dir: PathBuf,
    #[serde(skip, default = "default_level")]
    pub log_level: Level,
    pub probe_timeout_ms: u64,
    pub retry_interval_ms: u64,
}

fn default_level() -> Level {
    Level::INFO
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable {0} is missing or invalid.")]
    MissingOrInvalid(String),
    #[error("Parsing error: {0}")]
    ParsingError(String),
    #[error("Invalid device settings in environment: {0}")]
    Settings(#[from] SettingsError),
}

impl Config {
    /// Validate timeout values.
    fn validate_timeouts(&self) -> Result<(), ConfigError> {
        const MIN_TIMEOUT: u64 = 100;
        const MAX_TIMEOUT: u64 = 60_000;

        for (name, value) in [
            ("MMRC_PROBE_TIMEOUT_MS", self.probe_timeout_ms),
            ("MMRC_RETRY_INTERVAL_MS", self.retry_interval_ms),
        ] {
            if !(MIN_TIMEOUT..=MAX_TIMEOUT).contains(&value) {
                return Err(ConfigError::ParsingError(format!(
                    "{} must be between {} and {} ms",
                    name, MIN_TIMEOUT, MAX_TIMEOUT
                )));
            }
        }

        Ok(())
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok(); // Load environment variables from .env file
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let millis = |key: &str, default: u64| -> Result<u64, ConfigError> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| ConfigError::ParsingError(format!("{} must be a valid number", key))),
                None => Ok(default),
            }
        };

        let config = Self {
            settings_dir: lookup("MMRC_SETTINGS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            log_level: match lookup("MMRC_LOG_LEVEL") {
                Some(level) => level
                    .trim()
                    .parse::<Level>()
                    .map_err(|_| ConfigError::MissingOrInvalid("MMRC_LOG_LEVEL".to_string()))?,
                None => default_level(),
            },
            probe_timeout_ms: millis("MMRC_PROBE_TIMEOUT_MS", 3000)?,
            retry_interval_ms: millis("MMRC_RETRY_INTERVAL_MS", 1000)?,
        };

        // Validate timeouts after constructing the configuration
        config.validate_timeouts()?;

        Ok(config)
    }
}

impl Settings {
    /// The shipped defaults, overridden by environment variables named after header symbols.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Settings::default()
            .with_overrides(|key| env::var(key).ok())
            .map_err(ConfigError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.settings_dir, PathBuf::from("."));
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.probe_timeout_ms, 3000);
        assert_eq!(config.retry_interval_ms, 1000);
    }

    #[test]
    fn reads_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("MMRC_SETTINGS_DIR", "/srv/mmrc"),
            ("MMRC_LOG_LEVEL", "debug"),
            ("MMRC_RETRY_INTERVAL_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(config.settings_dir, PathBuf::from("/srv/mmrc"));
        assert_eq!(config.log_level, Level::DEBUG);
        assert_eq!(config.retry_interval_ms, 250);
    }

    #[test]
    fn rejects_out_of_range_timeouts() {
        let err = Config::from_lookup(lookup(&[("MMRC_PROBE_TIMEOUT_MS", "50")])).unwrap_err();
        assert!(matches!(err, ConfigError::ParsingError(_)));
        assert!(Config::from_lookup(lookup(&[("MMRC_RETRY_INTERVAL_MS", "60001")])).is_err());
    }

    #[test]
    fn rejects_unparsable_values() {
        assert!(matches!(
            Config::from_lookup(lookup(&[("MMRC_PROBE_TIMEOUT_MS", "soon")])),
            Err(ConfigError::ParsingError(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("MMRC_LOG_LEVEL", "loud")])),
            Err(ConfigError::MissingOrInvalid(_))
        ));
    }
}
