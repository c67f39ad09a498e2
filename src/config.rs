//! Configuration management with validation and defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level engine configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub round: RoundConfig,
    pub price: PriceConfig,
    pub limits: LimitsConfig,
    pub storage: StorageConfig,
}

/// Round timing configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundConfig {
    /// Multiplier clock tick interval (milliseconds)
    pub tick_interval_ms: u64,
    /// Linear multiplier growth per elapsed second
    pub growth_rate: f64,
    /// Pause between a crash and the next round start (milliseconds)
    pub pause_between_rounds_ms: u64,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            growth_rate: 0.1,
            pause_between_rounds_ms: 10_000,
        }
    }
}

impl RoundConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn pause_between_rounds(&self) -> Duration {
        Duration::from_millis(self.pause_between_rounds_ms)
    }
}

/// Price oracle cache configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceConfig {
    /// Freshness window for cached quotes (milliseconds)
    pub cache_max_age_ms: u64,
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            cache_max_age_ms: 10_000,
        }
    }
}

impl PriceConfig {
    pub fn cache_max_age(&self) -> Duration {
        Duration::from_millis(self.cache_max_age_ms)
    }
}

/// Bet limits
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum accepted bet size in USD
    pub max_bet_usd: f64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_bet_usd: 1_000_000.0,
        }
    }
}

/// Ledger storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_directory: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_directory: "./DB/crashline".to_string(),
        }
    }
}

impl EngineConfig {
    /// Fast timings for integration tests: short ticks and pauses so a
    /// round completes quickly.
    pub fn fast_rounds() -> Self {
        Self {
            round: RoundConfig {
                tick_interval_ms: 10,
                growth_rate: 1.0,
                pause_between_rounds_ms: 100,
            },
            ..Default::default()
        }
    }

    /// Load configuration from a TOML file, falling back to defaults for
    /// any omitted section.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        let config: Self = toml::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for logical consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.round.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "tick_interval_ms must be > 0".to_string(),
            ));
        }
        if !self.round.growth_rate.is_finite() || self.round.growth_rate <= 0.0 {
            return Err(ConfigError::Invalid(
                "growth_rate must be > 0".to_string(),
            ));
        }
        if self.price.cache_max_age_ms == 0 {
            return Err(ConfigError::Invalid(
                "cache_max_age_ms must be > 0".to_string(),
            ));
        }
        if !self.limits.max_bet_usd.is_finite() || self.limits.max_bet_usd <= 0.0 {
            return Err(ConfigError::Invalid(
                "max_bet_usd must be > 0".to_string(),
            ));
        }
        if self.storage.data_directory.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "data_directory must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Invalid configuration value: {0}")]
    Invalid(String),
}
