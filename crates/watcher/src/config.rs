//! Dispatcher configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Dispatcher configuration
///
/// Loaded from TOML; every field is optional:
/// ```toml
/// flush_interval_ms = 500
/// max_batch = 1000
/// channel_capacity = 1024
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// How often queued events are packed and released (default: 500ms)
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Maximum events packed per flush (default: 1000)
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,

    /// Capacity of the inbound event channel (default: 1024)
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: default_flush_interval_ms(),
            max_batch: default_max_batch(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl DispatchConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Check values are within range
    pub fn validate(&self) -> Result<()> {
        if !(1..=3_600_000).contains(&self.flush_interval_ms) {
            anyhow::bail!(
                "flush_interval_ms must be between 1 and 3600000, got {}",
                self.flush_interval_ms
            );
        }
        if self.max_batch == 0 {
            anyhow::bail!("max_batch must be at least 1");
        }
        if self.channel_capacity == 0 {
            anyhow::bail!("channel_capacity must be at least 1");
        }
        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

fn default_flush_interval_ms() -> u64 {
    500
}

fn default_max_batch() -> usize {
    1000
}

fn default_channel_capacity() -> usize {
    1024
}
