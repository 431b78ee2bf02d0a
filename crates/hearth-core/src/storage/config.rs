//! TOML-based service configuration.
//!
//! Stores household runtime settings:
//! - Time zone offset used for all calendar arithmetic
//! - Tick and gamification debounce intervals
//! - Snapshot file location override
//!
//! Configuration is stored at `~/.config/hearth/config.toml`.

use std::path::PathBuf;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::{ConfigError, Result};

/// Scheduling intervals, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Overdue-detection tick period.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    /// Quiet window before a batched gamification evaluation runs.
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: u64,
}

/// Service configuration.
///
/// Serialized to/from TOML at `~/.config/hearth/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Household time zone as minutes east of UTC. Midnight rollover and
    /// period buckets follow this zone.
    #[serde(default)]
    pub timezone_offset_minutes: i32,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Snapshot file override; defaults to `snapshot.json` in the data dir.
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
}

fn default_tick_interval_secs() -> u64 {
    60
}
fn default_debounce_secs() -> u64 {
    5
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            debounce_secs: default_debounce_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timezone_offset_minutes: 0,
            scheduler: SchedulerConfig::default(),
            snapshot_path: None,
        }
    }
}

impl Config {
    fn path() -> Result<PathBuf> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk, writing the default config on first run.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed, or
    /// if the default config cannot be written to disk.
    pub fn load() -> Result<Self> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content)
                    .map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
                Ok(cfg)
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    pub fn save(&self) -> Result<()> {
        let path = Self::path()?;
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Load from disk, returning the default on any error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    /// The configured time zone as a fixed offset. Out-of-range offsets
    /// fall back to UTC rather than failing at call sites.
    pub fn timezone(&self) -> FixedOffset {
        FixedOffset::east_opt(self.timezone_offset_minutes * 60)
            .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap())
    }

    /// Snapshot file location.
    pub fn snapshot_path(&self) -> Result<PathBuf> {
        match &self.snapshot_path {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("snapshot.json")),
        }
    }
}
