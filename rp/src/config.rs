//! reqpool configuration types and loading

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::pool::PoolConfig;
use crate::registry::{API_POOL, PoolRegistry, UPLOAD_POOL};

/// Main reqpool configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error); the CLI flag wins
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Per-name pool tuning, applied when the registry creates the pool
    pub pools: HashMap<String, PoolConfig>,
}

impl Config {
    /// Check every configured pool before any of them is spawned
    pub fn validate(&self) -> Result<()> {
        for (name, pool) in &self.pools {
            pool.validate().context(format!("Invalid configuration for pool {}", name))?;
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .reqpool.yml
        let local_config = PathBuf::from(".reqpool.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/reqpool/reqpool.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("reqpool").join("reqpool.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Effective config for a pool: configured entry, then built-in preset, then defaults
    pub fn pool_config(&self, name: &str) -> PoolConfig {
        if let Some(config) = self.pools.get(name) {
            return config.clone();
        }
        match name {
            UPLOAD_POOL => PoolConfig::upload(),
            API_POOL => PoolConfig::api(),
            _ => PoolConfig::default(),
        }
    }

    /// Registry seeded with the configured pool table
    pub fn registry(&self) -> PoolRegistry {
        PoolRegistry::with_configs(self.pools.clone())
    }
}
