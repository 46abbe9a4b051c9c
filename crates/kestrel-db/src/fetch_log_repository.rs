use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use kestrel_core::error::AppError;
use kestrel_core::models::{FetchLogEntry, FetchOutcome, NewFetchLogEntry};
use kestrel_core::traits::FetchLogStore;

#[derive(Clone)]
pub struct FetchLogRepository {
    pool: PgPool,
}

impl FetchLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Most recent entries first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<FetchLogEntry>, AppError> {
        let rows = sqlx::query_as::<_, FetchLogRow>(
            r#"
            SELECT id, url, outcome, items_observed, items_new, error_message, created_at
            FROM fetch_log
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[derive(sqlx::FromRow)]
struct FetchLogRow {
    id: Uuid,
    url: String,
    outcome: String,
    items_observed: i32,
    items_new: i32,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<FetchLogRow> for FetchLogEntry {
    fn from(row: FetchLogRow) -> Self {
        FetchLogEntry {
            id: row.id,
            url: row.url,
            outcome: row.outcome.parse().unwrap_or(FetchOutcome::Error),
            items_observed: row.items_observed,
            items_new: row.items_new,
            error_message: row.error_message,
            created_at: row.created_at,
        }
    }
}

impl FetchLogStore for FetchLogRepository {
    async fn record(&self, entry: &NewFetchLogEntry) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO fetch_log (url, outcome, items_observed, items_new, error_message)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&entry.url)
        .bind(entry.outcome.as_str())
        .bind(entry.items_observed)
        .bind(entry.items_new)
        .bind(&entry.error_message)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }
}
