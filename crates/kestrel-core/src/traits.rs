use std::future::Future;

use crate::error::AppError;
use crate::models::{NewFetchLogEntry, RawResponse, ResourceRecord};

/// Issues one HTTP GET and returns the raw response, whatever its status.
///
/// Implementations attach their own identifying headers. Only failures to
/// obtain a response at all are errors.
pub trait Transport: Send + Sync + Clone {
    fn get(&self, url: &str) -> impl Future<Output = Result<RawResponse, AppError>> + Send;
}

/// Fetches a JSON document from the upstream API.
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(&self, url: &str)
    -> impl Future<Output = Result<serde_json::Value, AppError>> + Send;
}

/// Persistence collaborator for fetched resources.
///
/// `upsert` must be idempotent: the job queue does not de-duplicate, so the
/// same resource may be fetched and stored more than once.
pub trait RecordStore: Send + Sync + Clone {
    fn exists(&self, id: i64) -> impl Future<Output = Result<bool, AppError>> + Send;

    fn upsert(&self, record: &ResourceRecord)
    -> impl Future<Output = Result<(), AppError>> + Send;

    /// Ids of known resources the remote still considers open, oldest fetch first.
    fn unfinished_ids(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<i64>, AppError>> + Send;
}

/// Persists fetch audit entries.
pub trait FetchLogStore: Send + Sync + Clone {
    fn record(
        &self,
        entry: &NewFetchLogEntry,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Posts human-readable summaries somewhere people will see them.
pub trait Notifier: Send + Sync + Clone {
    fn notify(&self, message: &str) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// `None` disables auditing.
impl<L: FetchLogStore> FetchLogStore for Option<L> {
    async fn record(&self, entry: &NewFetchLogEntry) -> Result<(), AppError> {
        match self {
            Some(log) => log.record(entry).await,
            None => Ok(()),
        }
    }
}

/// `None` drops notifications, for when no webhook is configured.
impl<N: Notifier> Notifier for Option<N> {
    async fn notify(&self, message: &str) -> Result<(), AppError> {
        match self {
            Some(notifier) => notifier.notify(message).await,
            None => Ok(()),
        }
    }
}
