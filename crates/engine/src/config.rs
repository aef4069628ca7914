//! Data access configuration via `dataaccess.toml`
//!
//! Retry policy, default cache timeout, scheduler limits and per-entity
//! overrides live in one TOML file. A commented default file is written on
//! first use; edit it and restart to change settings.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use dataaccess_core::{DataError, DataResult};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::retry::{RetryConfig, DEFAULT_MAX_ATTEMPTS};

/// Config file name
pub const CONFIG_FILE_NAME: &str = "dataaccess.toml";

/// Retry section (`[retry]`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetrySection {
    /// Total attempts per operation, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay after the first transient failure, doubled on each further one
    #[serde(default)]
    pub base_delay_ms: u64,
    /// Upper bound for a single delay
    #[serde(default)]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }
}

/// Cache section (`[cache]`)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheSection {
    /// Timeout applied to entities that declare none (0 = not cached)
    #[serde(default)]
    pub default_timeout_ms: u64,
}

/// Scheduler section (`[scheduler]`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchedulerSection {
    /// Failed commits before a transaction is dead-lettered (0 = never)
    #[serde(default = "default_max_commit_attempts")]
    pub max_commit_attempts: u32,
    /// Pause between background flush passes
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

fn default_max_commit_attempts() -> u32 {
    10
}

fn default_flush_interval_ms() -> u64 {
    1000
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            max_commit_attempts: default_max_commit_attempts(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

/// Per-entity override (`[entities.<Name>]`)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntityOverride {
    /// Replaces the entity's declared cache timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_timeout_ms: Option<u64>,
}

/// Configuration loaded from `dataaccess.toml`.
///
/// # Example
///
/// ```toml
/// [retry]
/// max_attempts = 6
///
/// [cache]
/// default_timeout_ms = 0
///
/// [entities.Country]
/// cache_timeout_ms = 60000
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataAccessConfig {
    /// Retry policy for reads and commits
    #[serde(default)]
    pub retry: RetrySection,
    /// Cache defaults
    #[serde(default)]
    pub cache: CacheSection,
    /// Scheduler limits
    #[serde(default)]
    pub scheduler: SchedulerSection,
    /// Per-entity overrides keyed by entity name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub entities: BTreeMap<String, EntityOverride>,
}

impl DataAccessConfig {
    /// Retry policy described by the `[retry]` section
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new()
            .with_max_attempts(self.retry.max_attempts)
            .with_base_delay(Duration::from_millis(self.retry.base_delay_ms))
            .with_max_delay(Duration::from_millis(self.retry.max_delay_ms))
    }

    /// Timeout for entities that declare none
    pub fn default_cache_timeout(&self) -> Duration {
        Duration::from_millis(self.cache.default_timeout_ms)
    }

    /// Pause between background flush passes
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.scheduler.flush_interval_ms)
    }

    /// Configured cache timeout overrides, by entity name
    pub fn cache_overrides(&self) -> impl Iterator<Item = (&str, Duration)> {
        self.entities.iter().filter_map(|(name, o)| {
            o.cache_timeout_ms
                .map(|ms| (name.as_str(), Duration::from_millis(ms)))
        })
    }

    /// Check values that parse but make no sense
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if a delay bound is below its base or the
    /// flush interval is zero.
    pub fn validate(&self) -> DataResult<()> {
        if self.retry.max_delay_ms != 0 && self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(DataError::configuration(format!(
                "retry.max_delay_ms ({}) is below retry.base_delay_ms ({})",
                self.retry.max_delay_ms, self.retry.base_delay_ms
            )));
        }
        if self.scheduler.flush_interval_ms == 0 {
            return Err(DataError::configuration(
                "scheduler.flush_interval_ms must be greater than 0",
            ));
        }
        if let Some(name) = self.entities.keys().find(|name| name.is_empty()) {
            return Err(DataError::configuration(format!(
                "invalid entity override name '{}'",
                name
            )));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Data access configuration
#
# Reads and commits that fail with a transient backend error (deadlock,
# lock timeout) are retried. Delays double after each failure up to
# max_delay_ms; 0 retries immediately.
[retry]
max_attempts = 6
base_delay_ms = 0
max_delay_ms = 0

# Cache timeout for entities that declare none. 0 disables caching.
[cache]
default_timeout_ms = 0

# Scheduled transactions that failed max_commit_attempts times are moved to
# the dead-letter list. 0 keeps retrying forever.
[scheduler]
max_commit_attempts = 10
flush_interval_ms = 1000

# Per-entity overrides
# [entities.Country]
# cache_timeout_ms = 60000
"#
    }

    /// Parse config from TOML text and validate it
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the text cannot be parsed or is invalid.
    pub fn from_toml_str(content: &str) -> DataResult<Self> {
        let config: DataAccessConfig = toml::from_str(content)
            .map_err(|e| DataError::configuration(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> DataResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DataAccessConfig = toml::from_str(&content).map_err(|e| {
            DataError::configuration(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        info!(target: "dataaccess::config", path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> DataResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml())?;
            info!(target: "dataaccess::config", path = %path.display(), "Wrote default configuration");
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> DataResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| DataError::Serialization(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_matches_observed_behavior() {
        let config = DataAccessConfig::default();
        assert_eq!(config.retry.max_attempts, 6);
        assert_eq!(config.retry_config(), RetryConfig::default());
        assert_eq!(config.default_cache_timeout(), Duration::ZERO);
        assert_eq!(config.scheduler.max_commit_attempts, 10);
        assert_eq!(config.flush_interval(), Duration::from_secs(1));
    }

    #[test]
    fn default_toml_parses_to_default() {
        let config = DataAccessConfig::from_toml_str(DataAccessConfig::default_toml()).unwrap();
        assert_eq!(config, DataAccessConfig::default());
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = DataAccessConfig::from_toml_str("").unwrap();
        assert_eq!(config, DataAccessConfig::default());
    }

    #[test]
    fn parse_entity_overrides() {
        let config = DataAccessConfig::from_toml_str(
            r#"
[entities.Country]
cache_timeout_ms = 60000

[entities.Order]
"#,
        )
        .unwrap();
        let overrides: Vec<_> = config.cache_overrides().collect();
        assert_eq!(overrides, vec![("Country", Duration::from_secs(60))]);
    }

    #[test]
    fn parse_retry_backoff() {
        let config = DataAccessConfig::from_toml_str(
            "[retry]\nmax_attempts = 3\nbase_delay_ms = 5\nmax_delay_ms = 50\n",
        )
        .unwrap();
        let retry = config.retry_config();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.delay_for(2), Duration::from_millis(10));
    }

    #[test]
    fn max_delay_below_base_is_rejected() {
        let err = DataAccessConfig::from_toml_str("[retry]\nbase_delay_ms = 50\nmax_delay_ms = 5\n")
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn zero_flush_interval_is_rejected() {
        let err =
            DataAccessConfig::from_toml_str("[scheduler]\nflush_interval_ms = 0\n").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn malformed_toml_is_configuration_error() {
        let err = DataAccessConfig::from_toml_str("[retry\nmax_attempts = ").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn write_default_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        assert!(!path.exists());

        DataAccessConfig::write_default_if_missing(&path).unwrap();
        assert!(path.exists());

        let config = DataAccessConfig::from_file(&path).unwrap();
        assert_eq!(config, DataAccessConfig::default());
    }

    #[test]
    fn write_default_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[retry]\nmax_attempts = 2\n").unwrap();

        DataAccessConfig::write_default_if_missing(&path).unwrap();

        let config = DataAccessConfig::from_file(&path).unwrap();
        assert_eq!(config.retry.max_attempts, 2);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = DataAccessConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, DataError::Io(_)));
    }

    #[test]
    fn write_to_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        let mut config = DataAccessConfig::default();
        config.cache.default_timeout_ms = 250;
        config.scheduler.max_commit_attempts = 0;
        config.entities.insert(
            "Country".to_string(),
            EntityOverride {
                cache_timeout_ms: Some(1000),
            },
        );

        config.write_to_file(&path).unwrap();
        let loaded = DataAccessConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
