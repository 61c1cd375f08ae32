//! Job record store for the Slidecast pipeline.
//!
//! The orchestrator reads and writes whole job records through
//! [`JobStore`]. Two backends are provided: an in-memory map and Redis.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

pub mod error;
pub mod redis_store;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use redis_store::RedisJobStore;
pub use store::{InMemoryJobStore, JobStore};

/// Which store backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Redis,
}

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Redis URL
    pub redis_url: String,
    /// Key prefix for job records
    pub key_prefix: String,
    /// Expiry for job records; `None` keeps them forever
    pub ttl: Option<Duration>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "slidecast".to_string(),
            ttl: None,
        }
    }
}

impl StoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let backend = match std::env::var("SLIDECAST_STORE").as_deref() {
            Ok("redis") => StoreBackend::Redis,
            _ => StoreBackend::Memory,
        };
        Self {
            backend,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            key_prefix: std::env::var("SLIDECAST_STORE_PREFIX")
                .unwrap_or_else(|_| "slidecast".to_string()),
            ttl: std::env::var("SLIDECAST_STORE_TTL")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs),
        }
    }
}

/// Open the configured store.
pub async fn connect(config: &StoreConfig) -> StoreResult<Arc<dyn JobStore>> {
    match config.backend {
        StoreBackend::Memory => {
            info!("Using in-memory job store");
            Ok(Arc::new(InMemoryJobStore::new()))
        }
        StoreBackend::Redis => {
            let store = RedisJobStore::new(&config.redis_url, config.key_prefix.clone(), config.ttl)?;
            store
                .ping()
                .await
                .map_err(|e| StoreError::connection_failed(e.to_string()))?;
            info!("Connected to Redis job store");
            Ok(Arc::new(store))
        }
    }
}
