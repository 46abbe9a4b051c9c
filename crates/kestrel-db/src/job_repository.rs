use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

use kestrel_core::error::AppError;
use kestrel_core::job::{EnqueueRequest, FetchJob, JobStatus, RetentionPolicy};
use kestrel_core::job_queue::JobQueue;

/// PostgreSQL-backed job queue using `SELECT FOR UPDATE SKIP LOCKED`.
#[derive(Clone)]
pub struct FetchJobRepository {
    pool: Pool<Postgres>,
}

impl FetchJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct FetchJobRow {
    id: Uuid,
    resource_id: i64,
    priority: i32,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    attempts: i32,
    max_attempts: i32,
    next_retry_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    worker_id: Option<String>,
}

impl From<FetchJobRow> for FetchJob {
    fn from(row: FetchJobRow) -> Self {
        FetchJob {
            id: row.id,
            resource_id: row.resource_id,
            priority: row.priority,
            status: row.status.parse().unwrap_or(JobStatus::Pending),
            created_at: row.created_at,
            updated_at: row.updated_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            attempts: row.attempts as u32,
            max_attempts: row.max_attempts as u32,
            next_retry_at: row.next_retry_at,
            error_message: row.error_message,
            worker_id: row.worker_id,
        }
    }
}

impl JobQueue for FetchJobRepository {
    async fn enqueue(&self, request: EnqueueRequest) -> Result<FetchJob, AppError> {
        let row = sqlx::query_as::<_, FetchJobRow>(
            r#"
            INSERT INTO fetch_jobs (resource_id, priority, max_attempts)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(request.resource_id)
        .bind(request.priority)
        .bind(request.max_attempts as i32)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.into())
    }

    async fn enqueue_bulk(&self, requests: &[EnqueueRequest]) -> Result<u64, AppError> {
        if requests.is_empty() {
            return Ok(0);
        }

        let resource_ids: Vec<i64> = requests.iter().map(|r| r.resource_id).collect();
        let priorities: Vec<i32> = requests.iter().map(|r| r.priority).collect();
        let max_attempts: Vec<i32> = requests.iter().map(|r| r.max_attempts as i32).collect();

        let result = sqlx::query(
            r#"
            INSERT INTO fetch_jobs (resource_id, priority, max_attempts)
            SELECT * FROM UNNEST($1::bigint[], $2::integer[], $3::integer[])
            "#,
        )
        .bind(&resource_ids)
        .bind(&priorities)
        .bind(&max_attempts)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn claim_job(&self, worker_id: &str) -> Result<Option<FetchJob>, AppError> {
        let row = sqlx::query_as::<_, FetchJobRow>(
            r#"
            UPDATE fetch_jobs
            SET status = 'running', worker_id = $1, started_at = NOW(), updated_at = NOW()
            WHERE id = (
                SELECT id FROM fetch_jobs
                WHERE status = 'pending'
                  AND (next_retry_at IS NULL OR next_retry_at <= NOW())
                ORDER BY priority ASC, next_retry_at NULLS FIRST, created_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    async fn complete_job(&self, job_id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE fetch_jobs
            SET status = 'completed', completed_at = NOW(), updated_at = NOW(),
                error_message = NULL, worker_id = NULL
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn fail_job(
        &self,
        job_id: Uuid,
        error: &str,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        // With a retry time the job goes back to pending; otherwise it is terminal.
        sqlx::query(
            r#"
            UPDATE fetch_jobs
            SET
                status = CASE WHEN $3::timestamptz IS NOT NULL THEN 'pending' ELSE 'failed' END,
                attempts = attempts + 1,
                next_retry_at = $3,
                error_message = $2,
                updated_at = NOW(),
                worker_id = NULL,
                started_at = CASE WHEN $3::timestamptz IS NOT NULL THEN NULL ELSE started_at END,
                completed_at = CASE WHEN $3::timestamptz IS NOT NULL THEN NULL ELSE NOW() END
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(error)
        .bind(next_retry_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<FetchJob>, AppError> {
        let row = sqlx::query_as::<_, FetchJobRow>(r#"SELECT * FROM fetch_jobs WHERE id = $1"#)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<FetchJob>, AppError> {
        let rows = sqlx::query_as::<_, FetchJobRow>(
            r#"
            SELECT * FROM fetch_jobs
            WHERE $1::varchar IS NULL OR status = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn release_worker_jobs(&self, worker_id: &str) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE fetch_jobs
            SET status = 'pending', worker_id = NULL, started_at = NULL, updated_at = NOW()
            WHERE worker_id = $1 AND status = 'running'
            "#,
        )
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<i64, AppError> {
        let (count,): (i64,) =
            sqlx::query_as(r#"SELECT COUNT(*) FROM fetch_jobs WHERE status = $1"#)
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(count)
    }

    async fn prune(&self, retention: &RetentionPolicy) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            WITH ranked AS (
                SELECT id, status,
                       ROW_NUMBER() OVER (
                           PARTITION BY status
                           ORDER BY COALESCE(completed_at, updated_at) DESC, id
                       ) AS rn
                FROM fetch_jobs
                WHERE status IN ('completed', 'failed')
            )
            DELETE FROM fetch_jobs f
            USING ranked r
            WHERE f.id = r.id
              AND ((r.status = 'completed' AND r.rn > $1)
                OR (r.status = 'failed' AND r.rn > $2))
            "#,
        )
        .bind(i64::from(retention.keep_completed))
        .bind(i64::from(retention.keep_failed))
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
