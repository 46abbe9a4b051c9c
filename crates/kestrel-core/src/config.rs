use std::str::FromStr;
use std::time::Duration;

use crate::backoff::BackoffConfig;
use crate::circuit_gate::GateConfig;
use crate::endpoints::Endpoints;
use crate::error::AppError;
use crate::pipeline::FetchConfig;
use crate::rate_limiter::RateLimiterConfig;

/// Settings for the fetch pipeline shared by every worker in the fleet.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub api_base_url: String,
    /// Namespace for the shared store keys. Workers that should coordinate
    /// must use the same prefix.
    pub key_prefix: String,
    pub rate_limit: RateLimiterConfig,
    pub gate: GateConfig,
    pub backoff: BackoffConfig,
    pub fetch: FetchConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_base_url: Endpoints::DEFAULT_BASE_URL.to_string(),
            key_prefix: "kestrel".to_string(),
            rate_limit: RateLimiterConfig::default(),
            gate: GateConfig::default(),
            backoff: BackoffConfig::default(),
            fetch: FetchConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Read configuration from environment variables, falling back to defaults.
    ///
    /// - `KESTREL_API_BASE_URL`
    /// - `KESTREL_KEY_PREFIX`
    /// - `KESTREL_RATE_LIMIT` (requests per second, fleet-wide, at least 1)
    /// - `KESTREL_MAX_THROTTLE_RETRIES`
    /// - `KESTREL_THROTTLE_PAUSE_SECS`
    /// - `KESTREL_OFFLINE_SLEEP_SECS`
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = Self::default();

        let api_base_url =
            std::env::var("KESTREL_API_BASE_URL").unwrap_or(defaults.api_base_url);
        Endpoints::new(&api_base_url)?;

        let key_prefix = std::env::var("KESTREL_KEY_PREFIX").unwrap_or(defaults.key_prefix);
        if key_prefix.trim().is_empty() {
            return Err(AppError::ConfigError(
                "KESTREL_KEY_PREFIX must not be empty".into(),
            ));
        }

        let max_per_second: u32 =
            env_or("KESTREL_RATE_LIMIT", defaults.rate_limit.max_per_second)?;
        if max_per_second == 0 {
            return Err(AppError::ConfigError(
                "KESTREL_RATE_LIMIT must be at least 1".into(),
            ));
        }

        let max_throttle_retries = env_or(
            "KESTREL_MAX_THROTTLE_RETRIES",
            defaults.fetch.max_throttle_retries,
        )?;
        let throttle_pause = env_or(
            "KESTREL_THROTTLE_PAUSE_SECS",
            defaults.gate.throttle_pause.as_secs(),
        )?;
        let offline_sleep = env_or(
            "KESTREL_OFFLINE_SLEEP_SECS",
            defaults.gate.offline_sleep.as_secs(),
        )?;

        Ok(Self {
            api_base_url,
            key_prefix,
            rate_limit: RateLimiterConfig::new(max_per_second),
            gate: GateConfig {
                offline_sleep: Duration::from_secs(offline_sleep),
                throttle_pause: Duration::from_secs(throttle_pause),
            },
            backoff: defaults.backoff,
            fetch: FetchConfig {
                max_throttle_retries,
                ..defaults.fetch
            },
        })
    }

    pub fn endpoints(&self) -> Result<Endpoints, AppError> {
        Endpoints::new(&self.api_base_url)
    }
}

/// Parse an optional env var, keeping `default` when it is unset.
pub fn env_or<T: FromStr>(name: &str, default: T) -> Result<T, AppError> {
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => raw.trim().parse().map_err(|_| {
            AppError::ConfigError(format!("Invalid {name} '{raw}': expected a number"))
        }),
    }
}
