use chrono::{DateTime, Utc};
use sqlx::PgPool;

use kestrel_core::error::AppError;
use kestrel_core::models::ResourceRecord;
use kestrel_core::traits::RecordStore;

/// PostgreSQL-backed store for fetched resources, keyed by remote id.
#[derive(Clone)]
pub struct ResourceRepository {
    pool: PgPool,
}

impl ResourceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: i64) -> Result<Option<StoredResource>, AppError> {
        let row = sqlx::query_as::<_, ResourceRow>(
            r#"
            SELECT id, payload, finished, first_seen_at, fetched_at
            FROM resources
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    /// Count stored resources, split into (total, unfinished).
    pub async fn counts(&self) -> Result<(i64, i64), AppError> {
        let counts: (i64, i64) = sqlx::query_as(
            r#"SELECT COUNT(*), COUNT(*) FILTER (WHERE NOT finished) FROM resources"#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(counts)
    }
}

/// A resource as stored, with bookkeeping timestamps.
#[derive(Debug, Clone)]
pub struct StoredResource {
    pub record: ResourceRecord,
    pub first_seen_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ResourceRow {
    id: i64,
    payload: serde_json::Value,
    finished: bool,
    first_seen_at: DateTime<Utc>,
    fetched_at: DateTime<Utc>,
}

impl From<ResourceRow> for StoredResource {
    fn from(row: ResourceRow) -> Self {
        StoredResource {
            record: ResourceRecord {
                id: row.id,
                payload: row.payload,
                finished: row.finished,
            },
            first_seen_at: row.first_seen_at,
            fetched_at: row.fetched_at,
        }
    }
}

impl RecordStore for ResourceRepository {
    async fn exists(&self, id: i64) -> Result<bool, AppError> {
        let (exists,): (bool,) =
            sqlx::query_as(r#"SELECT EXISTS(SELECT 1 FROM resources WHERE id = $1)"#)
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(exists)
    }

    async fn upsert(&self, record: &ResourceRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO resources (id, payload, finished)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE
            SET payload = EXCLUDED.payload,
                finished = EXCLUDED.finished,
                fetched_at = NOW()
            "#,
        )
        .bind(record.id)
        .bind(&record.payload)
        .bind(record.finished)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn unfinished_ids(&self, limit: usize) -> Result<Vec<i64>, AppError> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT id FROM resources
            WHERE NOT finished
            ORDER BY fetched_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
