//! The rate-limited fetch pipeline every upstream request goes through.
//!
//! ```text
//! check_offline ─► check_paused ─► acquire ─► GET ─► observe(budget)
//!       │                                              │
//!       └──────────── 420: pause fleet, sleep ◄────────┤
//!                                                      └─► parse JSON / RemoteError
//! ```
//!
//! Throttle responses are absorbed: the first worker to see one pauses the
//! whole fleet, sleeps the pause out and repeats the same request. The loop
//! is bounded by [`FetchConfig::max_throttle_retries`]; past the cap the
//! request fails with [`AppError::UpstreamThrottled`] and the job's own
//! backoff takes over.

use crate::backoff::{AdaptiveBackoff, ErrorBudget};
use crate::circuit_gate::CircuitGate;
use crate::config::PipelineConfig;
use crate::error::AppError;
use crate::models::RawResponse;
use crate::rate_limiter::RateLimiter;
use crate::shared_store::SharedStore;
use crate::traits::{Fetcher, Transport};

/// The upstream's "back off now" status.
pub const THROTTLE_STATUS: u16 = 420;

#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Throttle responses tolerated for one request before giving up.
    pub max_throttle_retries: u32,
    pub throttle_status: u16,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_throttle_retries: 10,
            throttle_status: THROTTLE_STATUS,
        }
    }
}

/// A [`Fetcher`] that gates, rate-limits and backs off around a [`Transport`].
#[derive(Clone)]
pub struct FetchPipeline<T, S> {
    transport: T,
    gate: CircuitGate<S>,
    limiter: RateLimiter<S>,
    backoff: AdaptiveBackoff,
    config: FetchConfig,
}

impl<T: Transport, S: SharedStore> FetchPipeline<T, S> {
    pub fn new(
        transport: T,
        gate: CircuitGate<S>,
        limiter: RateLimiter<S>,
        backoff: AdaptiveBackoff,
        config: FetchConfig,
    ) -> Self {
        Self {
            transport,
            gate,
            limiter,
            backoff,
            config,
        }
    }

    /// Wire every component to one shared store.
    pub fn from_config(transport: T, store: S, config: &PipelineConfig) -> Self {
        Self::new(
            transport,
            CircuitGate::new(store.clone(), &config.key_prefix, config.gate.clone()),
            RateLimiter::new(store, &config.key_prefix, config.rate_limit.clone()),
            AdaptiveBackoff::new(config.backoff.clone()),
            config.fetch.clone(),
        )
    }

    pub fn gate(&self) -> &CircuitGate<S> {
        &self.gate
    }

    async fn fetch_json(&self, url: &str) -> Result<serde_json::Value, AppError> {
        let mut throttled = 0u32;

        loop {
            self.gate.check_offline().await?;
            self.gate.check_paused().await?;
            self.limiter.acquire().await?;

            let response = self.transport.get(url).await?;
            self.backoff
                .observe(ErrorBudget::from_response(&response))
                .await;

            if response.status != self.config.throttle_status {
                return parse_body(&response);
            }

            throttled += 1;
            let pause = self.gate.config().throttle_pause;
            self.gate.pause(pause).await?;

            if throttled > self.config.max_throttle_retries {
                tracing::warn!(
                    %url,
                    attempts = throttled,
                    cap = self.config.max_throttle_retries,
                    "Throttle retry cap exceeded, giving up on request"
                );
                return Err(AppError::UpstreamThrottled {
                    attempts: throttled,
                });
            }

            tracing::warn!(
                %url,
                attempt = throttled,
                pause_secs = pause.as_secs(),
                "Upstream throttled request, retrying after pause"
            );
            tokio::time::sleep(pause).await;
        }
    }
}

impl<T: Transport, S: SharedStore> Fetcher for FetchPipeline<T, S> {
    async fn fetch(&self, url: &str) -> Result<serde_json::Value, AppError> {
        self.fetch_json(url).await
    }
}

/// Turn a non-throttle response into JSON or a [`AppError::RemoteError`].
fn parse_body(response: &RawResponse) -> Result<serde_json::Value, AppError> {
    let status_code = response.status;
    let value = match serde_json::from_str::<serde_json::Value>(&response.body) {
        Ok(value) => value,
        Err(_) if !response.is_success() => {
            return Err(AppError::RemoteError {
                status_code,
                message: format!("HTTP {status_code}"),
            });
        }
        Err(e) => return Err(AppError::SerializationError(e)),
    };

    if let Some(error) = value.as_object().and_then(|o| o.get("error")) {
        let message = match error {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Err(AppError::RemoteError {
            status_code,
            message,
        });
    }

    if !response.is_success() {
        return Err(AppError::RemoteError {
            status_code,
            message: format!("HTTP {status_code}"),
        });
    }

    Ok(value)
}
