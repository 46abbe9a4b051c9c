use thiserror::Error;

/// Application-wide error types for Kestrel.
#[derive(Error, Debug)]
pub enum AppError {
    /// The remote service is flagged offline fleet-wide.
    #[error("Upstream is offline")]
    UpstreamOffline,

    /// The remote kept answering with the throttle status past the retry cap.
    #[error("Upstream throttled the request {attempts} times in a row")]
    UpstreamThrottled { attempts: u32 },

    /// The remote answered with a structured error payload.
    #[error("Remote error (HTTP {status_code}): {message}")]
    RemoteError { status_code: u16, message: String },

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Shared counter store (rate window, pause, offline flag) failed.
    #[error("Shared store error: {0}")]
    StoreError(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl AppError {
    /// Returns true if a failed job should be re-attempted after its backoff.
    ///
    /// Offline and remote errors are left to the job's retry machinery;
    /// only configuration problems are treated as permanent.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, AppError::ConfigError(_))
    }

    /// Returns true if this error came from the remote side rather than
    /// from our own transport or storage.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            AppError::UpstreamOffline
                | AppError::UpstreamThrottled { .. }
                | AppError::RemoteError { .. }
        )
    }
}
