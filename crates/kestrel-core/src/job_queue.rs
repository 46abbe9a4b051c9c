use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::job::{EnqueueRequest, FetchJob, JobStatus, RetentionPolicy};

/// Persistent, priority-ordered queue of fetch jobs.
///
/// Implementations must support atomic claiming via `SELECT FOR UPDATE SKIP LOCKED`
/// or equivalent to prevent multiple workers from claiming the same job.
///
/// There is no de-duplication: enqueuing the same resource id twice yields two
/// independent jobs.
pub trait JobQueue: Send + Sync + Clone {
    fn enqueue(
        &self,
        request: EnqueueRequest,
    ) -> impl Future<Output = Result<FetchJob, AppError>> + Send;

    /// Enqueue many jobs in one round trip. Returns the number inserted.
    fn enqueue_bulk(
        &self,
        requests: &[EnqueueRequest],
    ) -> impl Future<Output = Result<u64, AppError>> + Send;

    /// Atomically claim the next due job: lowest priority value first, then
    /// earliest retry time, then oldest.
    ///
    /// Returns `None` if no jobs are available.
    fn claim_job(
        &self,
        worker_id: &str,
    ) -> impl Future<Output = Result<Option<FetchJob>, AppError>> + Send;

    fn complete_job(&self, job_id: Uuid) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Mark a job as failed. If `next_retry_at` is provided, the job is
    /// reset to `pending` for retry; otherwise it is marked as permanently `failed`.
    fn fail_job(
        &self,
        job_id: Uuid,
        error: &str,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn get_job(
        &self,
        job_id: Uuid,
    ) -> impl Future<Output = Result<Option<FetchJob>, AppError>> + Send;

    fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<FetchJob>, AppError>> + Send;

    /// Release all jobs held by a specific worker (for graceful shutdown).
    fn release_worker_jobs(
        &self,
        worker_id: &str,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;

    fn count_by_status(
        &self,
        status: JobStatus,
    ) -> impl Future<Output = Result<i64, AppError>> + Send;

    /// Delete terminal jobs beyond the retention caps. Returns rows deleted.
    fn prune(
        &self,
        retention: &RetentionPolicy,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;
}
