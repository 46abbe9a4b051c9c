use std::time::Duration;

use redis::aio::MultiplexedConnection;

use kestrel_core::error::AppError;
use kestrel_core::shared_store::SharedStore;

use crate::config::RedisConfig;

/// [`SharedStore`] on Redis. One multiplexed connection is shared by every
/// clone.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    pub async fn connect(config: &RedisConfig) -> Result<Self, AppError> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| AppError::ConfigError(format!("Invalid Redis URL: {e}")))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::StoreError(format!("Failed to connect: {e}")))?;

        Ok(Self { conn })
    }

    /// Round-trip check used at startup.
    pub async fn ping(&self) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;
        Ok(())
    }
}

fn store_error(e: redis::RedisError) -> AppError {
    AppError::StoreError(e.to_string())
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX).max(1)
}

impl SharedStore for RedisStore {
    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<i64, AppError> {
        let mut conn = self.conn.clone();
        // PEXPIRE NX only applies when the key has no TTL yet, so the window
        // is stamped once, by whichever increment created it.
        let (count, _): (i64, i64) = redis::pipe()
            .atomic()
            .cmd("INCR")
            .arg(key)
            .cmd("PEXPIRE")
            .arg(key)
            .arg(millis(ttl))
            .arg("NX")
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;
        Ok(count)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(millis(ttl));
        }
        let _: () = cmd.query_async(&mut conn).await.map_err(store_error)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;
        Ok(())
    }
}
