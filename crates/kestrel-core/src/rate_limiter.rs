//! Fleet-wide request throttling.
//!
//! Every worker process increments the same one-second window counter in the
//! [`SharedStore`]. A caller whose increment lands above the ceiling sleeps
//! for a full second and then proceeds. The limiter never reads the window
//! separately from incrementing it, so admission costs one round trip.
//!
//! The limiter is deliberately leaky: a burst of up to `max_per_second`
//! requests can be admitted at once, and a caller over the ceiling sleeps a
//! whole window rather than the exact remainder.
//!
//! # Example
//!
//! ```rust,no_run
//! use kestrel_core::rate_limiter::{RateLimiter, RateLimiterConfig};
//! use kestrel_core::shared_store::MemoryStore;
//!
//! # async fn run() -> Result<(), kestrel_core::error::AppError> {
//! let limiter = RateLimiter::new(MemoryStore::new(), "kestrel", RateLimiterConfig::new(25));
//! limiter.acquire().await?;
//! // ... issue exactly one request
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use crate::error::AppError;
use crate::shared_store::SharedStore;

/// Configuration for the shared rate limiter.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Requests admitted per window across the whole fleet.
    pub max_per_second: u32,

    /// Lifetime of one counting window.
    pub window: Duration,

    /// Sleep applied to a caller that lands over the ceiling.
    pub over_limit_sleep: Duration,
}

impl RateLimiterConfig {
    pub fn new(max_per_second: u32) -> Self {
        Self {
            max_per_second,
            ..Self::default()
        }
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_per_second: 25,
            window: Duration::from_secs(1),
            over_limit_sleep: Duration::from_secs(1),
        }
    }
}

/// Outcome of [`RateLimiter::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Admitted within the current window.
    Immediate,
    /// The window was full; the caller slept for the given duration first.
    Delayed(Duration),
}

/// Rate limiter shared by every process pointed at the same store.
#[derive(Clone)]
pub struct RateLimiter<S> {
    store: S,
    key: String,
    config: RateLimiterConfig,
}

impl<S: SharedStore> RateLimiter<S> {
    pub fn new(store: S, key_prefix: &str, config: RateLimiterConfig) -> Self {
        Self {
            store,
            key: format!("{key_prefix}:rate_window"),
            config,
        }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Wait until one request may be issued.
    pub async fn acquire(&self) -> Result<Admission, AppError> {
        let count = self
            .store
            .incr_with_expiry(&self.key, self.config.window)
            .await?;

        if count > i64::from(self.config.max_per_second) {
            tracing::debug!(
                count,
                ceiling = self.config.max_per_second,
                sleep_ms = %self.config.over_limit_sleep.as_millis(),
                "Rate ceiling reached"
            );
            tokio::time::sleep(self.config.over_limit_sleep).await;
            return Ok(Admission::Delayed(self.config.over_limit_sleep));
        }

        Ok(Admission::Immediate)
    }
}
