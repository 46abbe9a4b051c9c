use url::Url;

use crate::error::AppError;

/// URL builder for the upstream listing and resource endpoints.
#[derive(Debug, Clone)]
pub struct Endpoints {
    base: Url,
}

impl Endpoints {
    pub const DEFAULT_BASE_URL: &'static str = "https://esi.evetech.net/latest/";

    pub fn new(base_url: &str) -> Result<Self, AppError> {
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base = Url::parse(&normalized)
            .map_err(|e| AppError::ConfigError(format!("Invalid API base URL '{base_url}': {e}")))?;
        match base.scheme() {
            "http" | "https" => Ok(Self { base }),
            scheme => Err(AppError::ConfigError(format!(
                "API base URL scheme '{scheme}' is not allowed (only http/https)"
            ))),
        }
    }

    /// Listing of resource ids strictly below `max_id`, newest first.
    /// `None` asks for the newest page.
    pub fn listing(&self, max_id: Option<i64>) -> String {
        let mut url = self.join("wars/");
        if let Some(max_id) = max_id {
            url.query_pairs_mut()
                .append_pair("max_war_id", &max_id.to_string());
        }
        url.into()
    }

    pub fn resource(&self, id: i64) -> String {
        self.join(&format!("wars/{id}/")).into()
    }

    fn join(&self, path: &str) -> Url {
        // `path` is always relative and well-formed, so joining cannot fail.
        self.base.join(path).unwrap_or_else(|_| self.base.clone())
    }
}
