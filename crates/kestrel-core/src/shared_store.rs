//! Process-external shared state used for fleet-wide coordination.
//!
//! Every worker process talks to the same [`SharedStore`]: the rate window
//! counter, the pause deadline and the offline flag all live there. The
//! production implementation is Redis (see `kestrel-db`); [`MemoryStore`]
//! is an in-process stand-in for tests and single-process runs.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::AppError;

/// Atomic counters and scalar values with per-key expiry.
pub trait SharedStore: Send + Sync + Clone {
    /// Atomically increment `key` and return the new value.
    ///
    /// When the increment creates the key (the returned value is 1) the key
    /// expires after `ttl`.
    fn incr_with_expiry(
        &self,
        key: &str,
        ttl: Duration,
    ) -> impl Future<Output = Result<i64, AppError>> + Send;

    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, AppError>> + Send;

    /// Last-write-wins assignment. `ttl = None` keeps the value until deleted.
    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn delete(&self, key: &str) -> impl Future<Output = Result<(), AppError>> + Send;
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-memory [`SharedStore`].
///
/// Clones share the same map, so several simulated workers holding clones
/// observe each other's writes. Expiry follows `tokio::time`, which lets
/// tests drive it with a paused clock.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned shared store mutex");
            poisoned.into_inner()
        })
    }
}

impl SharedStore for MemoryStore {
    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> Result<i64, AppError> {
        let now = Instant::now();
        let mut entries = self.lock_entries();

        let current = match entries.get(key) {
            Some(entry) if entry.is_live(now) => entry.value.parse::<i64>().map_err(|_| {
                AppError::StoreError(format!("value at '{key}' is not an integer"))
            })?,
            _ => 0,
        };

        let next = current + 1;
        let expires_at = if next == 1 {
            Some(now + ttl)
        } else {
            entries.get(key).and_then(|e| e.expires_at)
        };
        entries.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at,
            },
        );

        Ok(next)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let now = Instant::now();
        let mut entries = self.lock_entries();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), AppError> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.lock_entries().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.lock_entries().remove(key);
        Ok(())
    }
}
