//! Adaptive post-response backoff driven by the upstream error budget.
//!
//! The upstream tells us, on every response, how many more error responses
//! it will tolerate (`remaining`) and when that allowance resets. The closer
//! the budget gets to zero the longer we sleep, on an exponential curve:
//!
//! ```text
//! factor   = max_factor ^ (1 - remaining / 100)
//! sleep_ms = min(max(base_ms * factor, min_ms), reset_seconds * 1000)
//! ```
//!
//! A full budget (`remaining >= 100`) never sleeps, and the sleep never
//! outlasts the budget's own reset window.

use std::time::Duration;

use crate::models::RawResponse;

pub const ERROR_LIMIT_REMAIN_HEADER: &str = "x-esi-error-limit-remain";
pub const ERROR_LIMIT_RESET_HEADER: &str = "x-esi-error-limit-reset";

/// Per-response error budget. Derived, used once, then dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorBudget {
    pub remaining: i64,
    pub reset_seconds: i64,
}

impl ErrorBudget {
    pub const FULL: i64 = 100;

    pub fn new(remaining: i64, reset_seconds: i64) -> Self {
        Self {
            remaining,
            reset_seconds,
        }
    }

    /// Read the budget headers, assuming a full budget and an immediate
    /// reset when they are missing or unparsable.
    pub fn from_response(response: &RawResponse) -> Self {
        let read = |name: &str, default: i64| {
            response
                .header(name)
                .and_then(|v| v.trim().parse::<i64>().ok())
                .unwrap_or(default)
        };
        Self {
            remaining: read(ERROR_LIMIT_REMAIN_HEADER, Self::FULL),
            reset_seconds: read(ERROR_LIMIT_RESET_HEADER, 0),
        }
    }
}

/// Configuration for the adaptive backoff curve.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Multiplier reached when the budget is fully exhausted.
    pub max_factor: f64,
    pub base_delay: Duration,
    pub min_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_factor: 120.0,
            base_delay: Duration::from_millis(200),
            min_delay: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AdaptiveBackoff {
    config: BackoffConfig,
}

impl AdaptiveBackoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    /// Compute the sleep for a budget without sleeping.
    pub fn delay_for(&self, budget: ErrorBudget) -> Duration {
        if budget.remaining >= ErrorBudget::FULL {
            return Duration::ZERO;
        }

        let remaining = budget.remaining.max(0) as f64;
        let exponent = 1.0 - remaining / ErrorBudget::FULL as f64;
        let factor = self.config.max_factor.powf(exponent);

        let base_ms = self.config.base_delay.as_millis() as f64;
        let min_ms = self.config.min_delay.as_millis() as f64;
        let max_ms = budget.reset_seconds.max(0).saturating_mul(1000) as f64;

        // The reset window is the hard ceiling, even below the floor.
        let sleep_ms = (base_ms * factor).max(min_ms).min(max_ms);
        Duration::from_millis(sleep_ms as u64)
    }

    /// Sleep according to the budget. Returns the time slept.
    pub async fn observe(&self, budget: ErrorBudget) -> Duration {
        let delay = self.delay_for(budget);
        if !delay.is_zero() {
            tracing::debug!(
                remaining = budget.remaining,
                reset_seconds = budget.reset_seconds,
                sleep_ms = %delay.as_millis(),
                "Error budget draining, backing off"
            );
            tokio::time::sleep(delay).await;
        }
        delay
    }
}
