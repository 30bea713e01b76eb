//! Named pool registry
//!
//! Independent subsystems share pools by name. The registry is owned by the
//! application and passed by reference; nothing here is global.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use eyre::Result;
use tracing::{debug, info};

use crate::pool::{PoolConfig, PoolExecutor, PoolStatistics};

/// Name of the preset pool for small, droppable uploads
pub const UPLOAD_POOL: &str = "uploads";

/// Name of the preset pool for non-droppable API calls
pub const API_POOL: &str = "api";

/// Pools keyed by name, created on first lookup and kept until `dispose_all`
#[derive(Debug, Default)]
pub struct PoolRegistry {
    pools: Mutex<HashMap<String, PoolExecutor>>,
    configs: HashMap<String, PoolConfig>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose pools pick up per-name configs on creation
    pub fn with_configs(configs: HashMap<String, PoolConfig>) -> Self {
        debug!(count = configs.len(), "PoolRegistry::with_configs: called");
        Self {
            pools: Mutex::new(HashMap::new()),
            configs,
        }
    }

    /// Get the named pool, creating it if needed
    ///
    /// A new pool uses `config` if given, else the configured entry for
    /// `name`, else the defaults. For an existing pool `config` is ignored.
    pub fn get_pool(&self, name: &str, config: Option<PoolConfig>) -> Result<PoolExecutor> {
        let mut pools = self.lock();
        if let Some(pool) = pools.get(name) {
            if config.is_some() {
                debug!(pool = %name, "PoolRegistry::get_pool: pool exists, ignoring supplied config");
            }
            return Ok(pool.clone());
        }

        let config = config
            .or_else(|| self.configs.get(name).cloned())
            .unwrap_or_default();
        info!(pool = %name, max_concurrent = config.max_concurrent, "Creating pool");
        let pool = PoolExecutor::spawn(name, config)?;
        pools.insert(name.to_string(), pool.clone());
        Ok(pool)
    }

    /// The shared upload pool (upload preset unless configured otherwise)
    pub fn upload_pool(&self) -> Result<PoolExecutor> {
        self.get_pool(UPLOAD_POOL, self.preset(UPLOAD_POOL, PoolConfig::upload))
    }

    /// The shared API pool (api preset unless configured otherwise)
    pub fn api_pool(&self) -> Result<PoolExecutor> {
        self.get_pool(API_POOL, self.preset(API_POOL, PoolConfig::api))
    }

    /// Names of the pools created so far, sorted
    pub fn pool_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Exact statistics of every pool, sorted by name
    pub async fn statistics(&self) -> Vec<PoolStatistics> {
        let pools: Vec<_> = self.lock().values().cloned().collect();
        let mut stats = Vec::with_capacity(pools.len());
        for pool in pools {
            stats.push(pool.statistics().await);
        }
        stats.sort_by(|a, b| a.pool.cmp(&b.pool));
        stats
    }

    /// Dispose every pool and forget them
    pub fn dispose_all(&self) {
        let pools: Vec<_> = self.lock().drain().collect();
        info!(count = pools.len(), "Disposing all pools");
        for (name, pool) in pools {
            debug!(pool = %name, "PoolRegistry::dispose_all: disposing");
            pool.dispose();
        }
    }

    fn preset(&self, name: &str, preset: fn() -> PoolConfig) -> Option<PoolConfig> {
        if self.configs.contains_key(name) { None } else { Some(preset()) }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PoolExecutor>> {
        // A panic elsewhere cannot leave the map half-written
        self.pools.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Priority;

    #[tokio::test]
    async fn test_same_name_returns_same_pool() {
        let registry = PoolRegistry::new();
        let first = registry.get_pool("search", None).unwrap();
        let second = registry
            .get_pool(
                "search",
                Some(PoolConfig {
                    max_concurrent: 9,
                    ..Default::default()
                }),
            )
            .unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(second.config().max_concurrent, first.config().max_concurrent);
        assert_eq!(second.config(), &PoolConfig::default());

        // Both handles drive one pool
        first.pause();
        assert_eq!(second.statistics().await.status, crate::pool::PoolStatus::Paused);
    }

    #[tokio::test]
    async fn test_presets() {
        let registry = PoolRegistry::new();
        let uploads = registry.upload_pool().unwrap();
        let api = registry.api_pool().unwrap();

        assert_eq!(uploads.name(), UPLOAD_POOL);
        assert_eq!(uploads.config(), &PoolConfig::upload());
        assert_eq!(api.config(), &PoolConfig::api());
        assert_eq!(registry.pool_names(), vec!["api".to_string(), "uploads".to_string()]);
    }

    #[tokio::test]
    async fn test_configured_entries_override_presets() {
        let custom = PoolConfig {
            max_concurrent: 1,
            max_queue_size: 3,
            ..PoolConfig::upload()
        };
        let registry = PoolRegistry::with_configs(HashMap::from([(UPLOAD_POOL.to_string(), custom.clone())]));

        assert_eq!(registry.upload_pool().unwrap().config(), &custom);
        assert_eq!(registry.api_pool().unwrap().config(), &PoolConfig::api());
    }

    #[tokio::test]
    async fn test_invalid_config_is_an_error() {
        let registry = PoolRegistry::new();
        let result = registry.get_pool(
            "broken",
            Some(PoolConfig {
                max_queue_size: 0,
                ..Default::default()
            }),
        );
        assert!(result.is_err());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_statistics_cover_every_pool() {
        let registry = PoolRegistry::new();
        let api = registry.api_pool().unwrap();
        registry.upload_pool().unwrap();

        api.submit("auth", Priority::High, || async { Ok::<_, eyre::Report>(()) })
            .await
            .unwrap();

        let stats = registry.statistics().await;
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].pool, "api");
        assert_eq!(stats[0].completed_requests, 1);
        assert_eq!(stats[1].pool, "uploads");
    }

    #[tokio::test]
    async fn test_dispose_all_empties_registry() {
        let registry = PoolRegistry::new();
        let uploads = registry.upload_pool().unwrap();
        registry.api_pool().unwrap();

        registry.dispose_all();
        assert!(registry.is_empty());

        let handle = uploads.submit("late", Priority::Normal, || async { Ok::<_, eyre::Report>(()) });
        assert!(handle.await.unwrap_err().to_string().contains("disposed"));

        // A later lookup builds a fresh pool
        let fresh = registry.upload_pool().unwrap();
        assert!(!fresh.is_disposed());
    }
}
