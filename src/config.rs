// src/config.rs

//! Configuration for the executors in this crate.
//!
//! Settings are plain serde structs with defaults for every field, so a
//! config file only needs to mention what it changes. The process-wide
//! [`CONFIG`] is loaded lazily from the JSON file named by
//! `KEEPALIVE_EXECUTOR_CONFIG`, falling back to defaults.

use std::path::Path;

use anyhow::Context;
use log::{info, warn};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::ExecutorError;

/// Environment variable naming a JSON config file.
pub const CONFIG_ENV_VAR: &str = "KEEPALIVE_EXECUTOR_CONFIG";

/// Global configuration, loaded on first access.
pub static CONFIG: Lazy<Config> = Lazy::new(Config::load_or_default);

/// Root of the configuration tree.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Worker pool settings used by [`ThreadPoolExecutor::from_config`](crate::ThreadPoolExecutor::from_config).
    pub pool: WorkPoolConfig,
}

/// Settings for a [`WorkPool`](crate::WorkPool).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkPoolConfig {
    /// Number of worker threads.
    pub num_workers: usize,
    /// Workers are named "{prefix}-{id}" when set.
    pub thread_name_prefix: Option<String>,
    /// Lock-free ring capacity per priority lane (rounded up to a power of 2).
    /// Work beyond it spills into an unbounded overflow list.
    pub queue_capacity: usize,
    /// Number of priority lanes.
    pub num_priorities: u8,
    /// Empty polls a worker spins through before yielding.
    pub spin_attempts: u32,
    /// Sleep between polls once a worker has stopped spinning.
    pub idle_sleep_us: u64,
}

impl Default for WorkPoolConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            thread_name_prefix: Some("work-pool".to_string()),
            queue_capacity: 1024,
            num_priorities: 1,
            spin_attempts: 100,
            idle_sleep_us: 50,
        }
    }
}

impl WorkPoolConfig {
    /// Check invariants:
    ///
    /// - `num_workers >= 1`
    /// - `queue_capacity >= 1`
    /// - `num_priorities >= 1`
    pub fn validate(&self) -> Result<(), ExecutorError> {
        if self.num_workers == 0 {
            return Err(ExecutorError::invalid_config("num_workers must be >= 1"));
        }
        if self.queue_capacity == 0 {
            return Err(ExecutorError::invalid_config("queue_capacity must be >= 1"));
        }
        if self.num_priorities == 0 {
            return Err(ExecutorError::invalid_config("num_priorities must be >= 1"));
        }
        Ok(())
    }
}

impl Config {
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let config: Config = serde_json::from_str(json).context("Failed to parse config JSON")?;
        config.pool.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Load from `KEEPALIVE_EXECUTOR_CONFIG`, or use defaults.
    ///
    /// A missing variable is normal; an unreadable or invalid file is logged
    /// and ignored.
    pub fn load_or_default() -> Self {
        let Some(path) = std::env::var_os(CONFIG_ENV_VAR) else {
            return Self::default();
        };
        let path = Path::new(&path);
        match Self::load(path) {
            Ok(config) => {
                info!("Loaded executor config from {}", path.display());
                config
            }
            Err(e) => {
                warn!("{:#}; using default executor config", e);
                Self::default()
            }
        }
    }
}
