use std::time::Duration;

use kestrel_core::error::AppError;
use kestrel_core::traits::Notifier;
use reqwest::Client;
use serde::Serialize;

const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Chat-style webhook that accepts `{"content": "..."}`.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
    timeout_secs: u64,
}

#[derive(Serialize)]
struct WebhookMessage<'a> {
    content: &'a str,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Result<Self, AppError> {
        let parsed = url::Url::parse(url)
            .map_err(|e| AppError::ConfigError(format!("Invalid webhook URL: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::ConfigError(format!(
                "Webhook URL scheme '{}' is not allowed (only http/https)",
                parsed.scheme()
            )));
        }

        let client = Client::builder()
            .timeout(DEFAULT_WEBHOOK_TIMEOUT)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            url: url.to_string(),
            timeout_secs: DEFAULT_WEBHOOK_TIMEOUT.as_secs(),
        })
    }
}

impl Notifier for WebhookNotifier {
    async fn notify(&self, message: &str) -> Result<(), AppError> {
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookMessage { content: message })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout(self.timeout_secs)
                } else if e.is_connect() {
                    AppError::NetworkError(format!("Connection failed: {e}"))
                } else {
                    AppError::HttpError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::HttpError(format!(
                "Webhook returned HTTP {}",
                status.as_u16()
            )));
        }
        Ok(())
    }
}
