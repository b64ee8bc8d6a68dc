//! Configuration file for rote
//!
//! ```toml
//! [scheduler]
//! desired_retention = 0.9
//! maximum_interval = 36500
//! minimum_stability = 0.01
//! fuzz_factor = 0.05
//! # weights = [19 numbers]
//!
//! [persistence]
//! write_retries = 2
//!
//! [session]
//! seed = 42
//! new_cards_last = true
//! ```
//!
//! Every key is optional; missing keys take their defaults.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::flashcards::algorithm::{Parameters, MAX_STABILITY};
use crate::flashcards::{SessionOptions, MIN_STORED_STABILITY};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoteConfig {
    pub scheduler: Parameters,
    pub persistence: PersistenceConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Extra attempts after a failed save
    pub write_retries: u32,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self { write_retries: 2 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Fixed fuzz seed; a random one is drawn per session when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub new_cards_last: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            seed: None,
            new_cards_last: true,
        }
    }
}

impl RoteConfig {
    /// `<config dir>/rote/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("rote").join("config.toml"))
    }

    /// Load from `path` if given (it must exist), otherwise from the default
    /// location if a file is there, otherwise use defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => {
                    log::debug!("No config file, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        log::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: RoteConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject parameter sets the memory model cannot work with
    pub fn validate(&self) -> Result<()> {
        let p = &self.scheduler;
        if let Some(i) = p.weights.iter().position(|w| !w.is_finite()) {
            return Err(ConfigError::Invalid(format!("scheduler.weights[{i}] is not finite")));
        }
        if p.weights[..4].iter().any(|w| *w <= 0.0) {
            return Err(ConfigError::Invalid(
                "scheduler.weights[0..4] (initial stabilities) must be positive".to_string(),
            ));
        }
        if !(p.desired_retention > 0.0 && p.desired_retention < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "scheduler.desired_retention must be within (0, 1), got {}",
                p.desired_retention
            )));
        }
        if p.maximum_interval == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.maximum_interval must be at least 1".to_string(),
            ));
        }
        // Anything smaller would be written to disk as zero
        if !(p.minimum_stability >= MIN_STORED_STABILITY && p.minimum_stability <= MAX_STABILITY) {
            return Err(ConfigError::Invalid(format!(
                "scheduler.minimum_stability must be within [{MIN_STORED_STABILITY}, {MAX_STABILITY}], got {}",
                p.minimum_stability
            )));
        }
        if !(0.0..1.0).contains(&p.fuzz_factor) {
            return Err(ConfigError::Invalid(format!(
                "scheduler.fuzz_factor must be within [0, 1), got {}",
                p.fuzz_factor
            )));
        }
        Ok(())
    }

    /// Session inputs for a drill on `today`, with `seed` used when the
    /// config does not fix one
    pub fn session_options(&self, today: NaiveDate, seed: u64) -> SessionOptions {
        SessionOptions {
            params: self.scheduler.clone(),
            today,
            seed: self.session.seed.unwrap_or(seed),
            new_cards_last: self.session.new_cards_last,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flashcards::algorithm::DEFAULT_WEIGHTS;
    use tempfile::TempDir;

    #[test]
    fn test_empty_config_is_default() {
        let config = RoteConfig::from_toml_str("").unwrap();
        assert_eq!(config, RoteConfig::default());
        assert_eq!(config.scheduler.weights, DEFAULT_WEIGHTS);
        assert_eq!(config.persistence.write_retries, 2);
        assert!(config.session.new_cards_last);
    }

    #[test]
    fn test_partial_config() {
        let config = RoteConfig::from_toml_str(
            r#"
            [scheduler]
            desired_retention = 0.85
            fuzz_factor = 0.0

            [session]
            seed = 42
            "#,
        )
        .unwrap();
        assert_eq!(config.scheduler.desired_retention, 0.85);
        assert_eq!(config.scheduler.fuzz_factor, 0.0);
        assert_eq!(config.scheduler.maximum_interval, 36_500);
        assert_eq!(config.session.seed, Some(42));

        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        assert_eq!(config.session_options(today, 7).seed, 42);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = RoteConfig::from_toml_str("[scheduler]\ndesired_retention = 1.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = RoteConfig::from_toml_str("[scheduler]\nweights = [1.0, 2.0]\n").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));

        let err = RoteConfig::from_toml_str("[scheduler]\nminimum_stability = 0.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = RoteConfig::from_toml_str("[scheduler]\nminimum_stability = 0.00001\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(RoteConfig::from_toml_str("[scheduler]\nminimum_stability = 0.0001\n").is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "[persistence]\nwrite_retries = 5\n").unwrap();

        let config = RoteConfig::load(Some(&path)).unwrap();
        assert_eq!(config.persistence.write_retries, 5);

        let missing = temp.path().join("missing.toml");
        assert!(matches!(RoteConfig::load(Some(&missing)), Err(ConfigError::Io { .. })));
    }
}
