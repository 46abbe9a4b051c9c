//! Fleet-wide stop conditions consulted before every outbound request.
//!
//! Two independent conditions live in the [`SharedStore`]:
//!
//! ```text
//! offline flag  --set by monitor-->  check_offline(): sleep, then fail with UpstreamOffline
//! paused_until  --set by fetchers--> check_paused():  sleep until the deadline, then proceed
//! ```
//!
//! The offline flag is a hard stop surfaced to the job's retry machinery.
//! The pause is cooperative: any worker that sees the throttle status writes
//! a deadline and every other worker waits it out. Pause writes are plain
//! last-write-wins `SET`s with an expiry matching the pause.

use std::time::Duration;

use chrono::Utc;

use crate::error::AppError;
use crate::shared_store::SharedStore;

/// Configuration for the circuit gate.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// How long a caller sleeps before failing when the upstream is offline.
    pub offline_sleep: Duration,

    /// Fleet-wide pause applied when the upstream signals throttling.
    pub throttle_pause: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            offline_sleep: Duration::from_secs(30),
            throttle_pause: Duration::from_secs(60),
        }
    }
}

/// Snapshot of the gate for monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Requests may flow.
    Clear,
    /// The upstream is flagged offline.
    Offline,
    /// A throttle pause is active for the given remaining time.
    Paused { remaining: Duration },
}

impl std::fmt::Display for GateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateState::Clear => write!(f, "clear"),
            GateState::Offline => write!(f, "offline"),
            GateState::Paused { remaining } => {
                write!(f, "paused ({}s remaining)", remaining.as_secs())
            }
        }
    }
}

/// Offline/pause gate shared through a [`SharedStore`].
#[derive(Clone)]
pub struct CircuitGate<S> {
    store: S,
    offline_key: String,
    pause_key: String,
    config: GateConfig,
}

impl<S: SharedStore> CircuitGate<S> {
    pub fn new(store: S, key_prefix: &str, config: GateConfig) -> Self {
        Self {
            store,
            offline_key: format!("{key_prefix}:offline"),
            pause_key: format!("{key_prefix}:paused_until"),
            config,
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Fail the current attempt if the upstream is flagged offline.
    pub async fn check_offline(&self) -> Result<(), AppError> {
        if self.is_offline().await? {
            tracing::warn!(
                sleep_secs = self.config.offline_sleep.as_secs(),
                "Upstream flagged offline, failing attempt"
            );
            tokio::time::sleep(self.config.offline_sleep).await;
            return Err(AppError::UpstreamOffline);
        }
        Ok(())
    }

    /// Sleep out an active pause. Returns how long the caller waited.
    pub async fn check_paused(&self) -> Result<Option<Duration>, AppError> {
        let remaining = self.paused_remaining().await?;
        if let Some(remaining) = remaining {
            tracing::info!(
                sleep_ms = %remaining.as_millis(),
                "Upstream pause active, waiting"
            );
            tokio::time::sleep(remaining).await;
        }
        Ok(remaining)
    }

    /// Pause every worker in the fleet for `duration` from now.
    pub async fn pause(&self, duration: Duration) -> Result<(), AppError> {
        let until = Utc::now().timestamp_millis() + duration.as_millis() as i64;
        self.store
            .set(&self.pause_key, &until.to_string(), Some(duration))
            .await?;
        tracing::warn!(
            pause_secs = duration.as_secs(),
            paused_until = until,
            "Pausing upstream requests fleet-wide"
        );
        Ok(())
    }

    pub async fn is_offline(&self) -> Result<bool, AppError> {
        let value = self.store.get(&self.offline_key).await?;
        Ok(value.is_some_and(|v| {
            let v = v.trim();
            !v.is_empty() && v != "0" && !v.eq_ignore_ascii_case("false")
        }))
    }

    /// Operator toggle for the offline flag. The fetch path only reads it.
    pub async fn set_offline(&self, offline: bool) -> Result<(), AppError> {
        if offline {
            self.store.set(&self.offline_key, "1", None).await
        } else {
            self.store.delete(&self.offline_key).await
        }
    }

    /// Time left on the active pause, if any.
    pub async fn paused_remaining(&self) -> Result<Option<Duration>, AppError> {
        let Some(raw) = self.store.get(&self.pause_key).await? else {
            return Ok(None);
        };
        let Ok(until) = raw.trim().parse::<i64>() else {
            tracing::warn!(value = %raw, "Ignoring malformed pause deadline");
            return Ok(None);
        };

        let now = Utc::now().timestamp_millis();
        if until > now {
            Ok(Some(Duration::from_millis((until - now) as u64)))
        } else {
            Ok(None)
        }
    }

    pub async fn state(&self) -> Result<GateState, AppError> {
        if self.is_offline().await? {
            return Ok(GateState::Offline);
        }
        Ok(match self.paused_remaining().await? {
            Some(remaining) => GateState::Paused { remaining },
            None => GateState::Clear,
        })
    }
}
