//! Configuration for overdue-core
//!
//! Centralized configuration for the change feed, timer retries and
//! storage location.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// System-wide configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverdueConfig {
    /// Change feed partitioning and delivery settings
    pub feed: FeedConfig,
    /// Timer entity settings
    pub timer: TimerConfig,
    /// Storage settings
    pub storage: StorageConfig,
}

/// Change feed configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Number of feed partitions (one consumer loop each)
    pub partitions: u32,
    /// Maximum number of documents handed to the consumer at once
    pub max_batch_size: usize,
    /// Deliveries of a failing batch before it is dead-lettered
    pub max_delivery_attempts: u32,
    /// Delay before a failed batch is redelivered, in milliseconds
    pub redelivery_delay_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            partitions: 4,
            max_batch_size: 100,
            max_delivery_attempts: 5,
            redelivery_delay_ms: 1_000,
        }
    }
}

impl FeedConfig {
    pub fn redelivery_delay(&self) -> Duration {
        Duration::from_millis(self.redelivery_delay_ms)
    }
}

/// Upper bound for `timer.retry_delay_ms` (one day)
pub const MAX_RETRY_DELAY_MS: u64 = 86_400_000;

/// Timer entity configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Delay before a failed wake-up is delivered again, in milliseconds
    pub retry_delay_ms: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: 5_000,
        }
    }
}

impl TimerConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Storage configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path; items and entities stay in memory when unset
    pub database_path: Option<PathBuf>,
}

impl OverdueConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard config file location (`<config dir>/overdue/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("overdue").join("config.toml"))
    }

    /// Load and validate configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_toml(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Serialize configuration to TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load configuration from a JSON string
    pub fn from_json(json_str: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json_str)
    }

    /// Serialize configuration to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feed.partitions == 0 {
            return Err(ConfigError::OutOfRange(
                "feed.partitions must be at least 1".to_string(),
            ));
        }

        if self.feed.max_batch_size == 0 {
            return Err(ConfigError::OutOfRange(
                "feed.max_batch_size must be at least 1".to_string(),
            ));
        }

        if self.feed.max_delivery_attempts == 0 {
            return Err(ConfigError::OutOfRange(
                "feed.max_delivery_attempts must be at least 1".to_string(),
            ));
        }

        if self.timer.retry_delay_ms == 0 {
            return Err(ConfigError::OutOfRange(
                "timer.retry_delay_ms must be positive".to_string(),
            ));
        }

        if self.timer.retry_delay_ms > MAX_RETRY_DELAY_MS {
            return Err(ConfigError::OutOfRange(format!(
                "timer.retry_delay_ms must be at most {}",
                MAX_RETRY_DELAY_MS
            )));
        }

        Ok(())
    }
}

/// Configuration loading and validation error
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Value is out of valid range
    #[error("Value out of range: {0}")]
    OutOfRange(String),
    /// Config text could not be parsed or rendered
    #[error("Parse error: {0}")]
    Parse(String),
    /// Config file could not be read
    #[error("IO error: {0}")]
    Io(String),
}
