use std::time::Duration;

use kestrel_core::config::env_or;
use kestrel_core::error::AppError;
use kestrel_core::models::RawResponse;
use kestrel_core::traits::Transport;
use reqwest::Client;
use reqwest::header::{FROM, HeaderMap, HeaderValue};

const DEFAULT_USER_AGENT: &str = concat!("Kestrel/", env!("CARGO_PKG_VERSION"));
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Identification and timeout settings for the upstream HTTP client.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub user_agent: String,
    /// Sent as the `From` header so the upstream operators can reach us.
    pub contact: Option<String>,
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            contact: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl TransportConfig {
    /// Reads `KESTREL_USER_AGENT`, `KESTREL_CONTACT` and `KESTREL_HTTP_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = Self::default();
        let timeout_secs = env_or("KESTREL_HTTP_TIMEOUT_SECS", defaults.timeout.as_secs())?;
        if timeout_secs == 0 {
            return Err(AppError::ConfigError(
                "KESTREL_HTTP_TIMEOUT_SECS must be at least 1".into(),
            ));
        }

        Ok(Self {
            user_agent: std::env::var("KESTREL_USER_AGENT").unwrap_or(defaults.user_agent),
            contact: std::env::var("KESTREL_CONTACT")
                .ok()
                .filter(|c| !c.trim().is_empty()),
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = Some(contact.into());
        self
    }
}

/// HTTP transport using reqwest.
///
/// Returns every response the server produces, whatever its status. Status
/// interpretation belongs to the fetch pipeline.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    timeout_secs: u64,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, AppError> {
        Self::with_config(&TransportConfig::default())
    }

    pub fn with_config(config: &TransportConfig) -> Result<Self, AppError> {
        let mut headers = HeaderMap::new();
        if let Some(contact) = &config.contact {
            let value = HeaderValue::from_str(contact).map_err(|_| {
                AppError::ConfigError(format!("Invalid contact header value '{contact}'"))
            })?;
            headers.insert(FROM, value);
        }

        let client = Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            timeout_secs: config.timeout.as_secs(),
        })
    }

    fn map_send_error(&self, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::Timeout(self.timeout_secs)
        } else if e.is_connect() {
            AppError::NetworkError(format!("Connection failed: {e}"))
        } else {
            AppError::HttpError(e.to_string())
        }
    }
}

impl Transport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<RawResponse, AppError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = response
            .text()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to read response body: {e}")))?;

        tracing::debug!(%url, status, bytes = body.len(), "Upstream response");

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}
