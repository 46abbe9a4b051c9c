use kestrel_core::AppError;

/// Configuration for the database connection pool.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    /// Read configuration from environment variables.
    ///
    /// - `DATABASE_URL` (required)
    /// - `DATABASE_MAX_CONNECTIONS` (optional, defaults to 5)
    pub fn from_env() -> Result<Self, AppError> {
        let url = std::env::var("DATABASE_URL").map_err(|_| {
            AppError::ConfigError("DATABASE_URL not set. Required for database operations.".into())
        })?;

        let max_connections = match std::env::var("DATABASE_MAX_CONNECTIONS") {
            Err(_) => 5,
            Ok(raw) => {
                let parsed: u32 = raw.parse().map_err(|_| {
                    AppError::ConfigError(format!(
                        "Invalid DATABASE_MAX_CONNECTIONS '{raw}': must be a positive integer"
                    ))
                })?;
                if parsed == 0 {
                    return Err(AppError::ConfigError(
                        "DATABASE_MAX_CONNECTIONS must be at least 1".into(),
                    ));
                }
                parsed
            }
        };

        Ok(Self {
            url,
            max_connections,
        })
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }
}

/// Connection settings for the Redis-backed shared store.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Read `REDIS_URL`. Returns `Ok(None)` when it is unset, so callers can
    /// fall back to an in-process store.
    pub fn from_env() -> Result<Option<Self>, AppError> {
        match std::env::var("REDIS_URL") {
            Err(_) => Ok(None),
            Ok(url) => Self::parse(&url),
        }
    }

    /// Validate a Redis URL. Blank means "not configured".
    pub fn parse(url: &str) -> Result<Option<Self>, AppError> {
        let url = url.trim();
        if url.is_empty() {
            return Ok(None);
        }
        if !["redis://", "rediss://", "unix://"]
            .iter()
            .any(|scheme| url.starts_with(scheme))
        {
            return Err(AppError::ConfigError(format!(
                "Invalid REDIS_URL '{url}': expected a redis://, rediss:// or unix:// URL"
            )));
        }
        Ok(Some(Self::new(url)))
    }
}
