use std::time::Duration;

use kestrel_core::error::AppError;
use kestrel_core::shared_store::{MemoryStore, SharedStore};
use kestrel_db::{RedisConfig, RedisStore};

/// The shared store picked at startup: Redis when configured, otherwise an
/// in-process map that only coordinates tasks inside this process.
#[derive(Clone)]
pub enum AnyStore {
    Redis(RedisStore),
    Memory(MemoryStore),
}

impl AnyStore {
    pub async fn from_env() -> Result<Self, AppError> {
        match RedisConfig::from_env()? {
            Some(config) => {
                let store = RedisStore::connect(&config).await?;
                store.ping().await?;
                tracing::info!("Using Redis shared store");
                Ok(Self::Redis(store))
            }
            None => {
                tracing::warn!(
                    "REDIS_URL not set, using in-process store; fleet-wide rate limiting and pauses are disabled"
                );
                Ok(Self::Memory(MemoryStore::new()))
            }
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, Self::Redis(_))
    }
}

impl SharedStore for AnyStore {
    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<i64, AppError> {
        match self {
            Self::Redis(s) => s.incr_with_expiry(key, ttl).await,
            Self::Memory(s) => s.incr_with_expiry(key, ttl).await,
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        match self {
            Self::Redis(s) => s.get(key).await,
            Self::Memory(s) => s.get(key).await,
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), AppError> {
        match self {
            Self::Redis(s) => s.set(key, value, ttl).await,
            Self::Memory(s) => s.set(key, value, ttl).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        match self {
            Self::Redis(s) => s.delete(key).await,
            Self::Memory(s) => s.delete(key).await,
        }
    }
}
