use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::endpoints::Endpoints;
use crate::error::AppError;
use crate::job::{FetchJob, WorkerConfig};
use crate::job_queue::JobQueue;
use crate::models::ResourceRecord;
use crate::traits::{Fetcher, RecordStore};

/// Events emitted by the worker for monitoring/logging.
#[derive(Debug, Clone)]
pub enum WorkerEvent<'a> {
    Started {
        worker_id: &'a str,
    },
    Polling,
    JobClaimed {
        job: &'a FetchJob,
    },
    JobCompleted {
        job_id: Uuid,
        resource_id: i64,
        finished: bool,
    },
    JobFailed {
        job_id: Uuid,
        resource_id: i64,
        error: &'a str,
        will_retry: bool,
    },
    Pruned {
        deleted: u64,
    },
    ShuttingDown {
        worker_id: &'a str,
        jobs_released: u64,
    },
    Stopped {
        worker_id: &'a str,
    },
}

/// Trait for receiving worker events (decoupled logging).
pub trait WorkerReporter: Send + Sync {
    fn report(&self, event: WorkerEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWorkerReporter;

impl WorkerReporter for TracingWorkerReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        match event {
            WorkerEvent::Started { worker_id } => {
                tracing::info!(%worker_id, "Worker started");
            }
            WorkerEvent::Polling => {
                tracing::debug!("Polling for jobs");
            }
            WorkerEvent::JobClaimed { job } => {
                tracing::info!(
                    job_id = %job.id,
                    resource_id = job.resource_id,
                    priority = job.priority,
                    attempts = job.attempts,
                    "Job claimed"
                );
            }
            WorkerEvent::JobCompleted {
                job_id,
                resource_id,
                finished,
            } => {
                tracing::info!(%job_id, resource_id, finished, "Job completed");
            }
            WorkerEvent::JobFailed {
                job_id,
                resource_id,
                error,
                will_retry,
            } => {
                tracing::warn!(%job_id, resource_id, %error, %will_retry, "Job failed");
            }
            WorkerEvent::Pruned { deleted } => {
                tracing::debug!(deleted, "Pruned terminal jobs");
            }
            WorkerEvent::ShuttingDown {
                worker_id,
                jobs_released,
            } => {
                tracing::info!(%worker_id, %jobs_released, "Worker shutting down");
            }
            WorkerEvent::Stopped { worker_id } => {
                tracing::info!(%worker_id, "Worker stopped");
            }
        }
    }
}

/// Worker that polls the job queue, fetches each resource and persists it.
#[derive(Clone)]
pub struct WorkerService<Q, F, R>
where
    Q: JobQueue,
    F: Fetcher,
    R: RecordStore,
{
    queue: Q,
    fetcher: F,
    records: R,
    endpoints: Endpoints,
    config: WorkerConfig,
}

impl<Q, F, R> WorkerService<Q, F, R>
where
    Q: JobQueue,
    F: Fetcher,
    R: RecordStore,
{
    pub fn new(queue: Q, fetcher: F, records: R, endpoints: Endpoints, config: WorkerConfig) -> Self {
        Self {
            queue,
            fetcher,
            records,
            endpoints,
            config,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.config.worker_id
    }

    /// Run the worker loop until cancellation.
    pub async fn run<WR: WorkerReporter>(
        &self,
        cancel_token: CancellationToken,
        reporter: &WR,
    ) -> Result<(), AppError> {
        reporter.report(WorkerEvent::Started {
            worker_id: &self.config.worker_id,
        });

        loop {
            if cancel_token.is_cancelled() {
                break;
            }

            reporter.report(WorkerEvent::Polling);

            match self.queue.claim_job(&self.config.worker_id).await {
                Ok(Some(job)) => {
                    reporter.report(WorkerEvent::JobClaimed { job: &job });
                    self.process_job(&job, reporter).await;
                }
                Ok(None) => {
                    tokio::select! {
                        () = tokio::time::sleep(self.config.poll_interval) => {}
                        () = cancel_token.cancelled() => break,
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to claim job");
                    tokio::select! {
                        () = tokio::time::sleep(self.config.poll_interval * 2) => {}
                        () = cancel_token.cancelled() => break,
                    }
                }
            }
        }

        let released = match self.queue.release_worker_jobs(&self.config.worker_id).await {
            Ok(n) => n,
            Err(e) => {
                tracing::error!(error = %e, "Failed to release claimed jobs");
                0
            }
        };

        reporter.report(WorkerEvent::ShuttingDown {
            worker_id: &self.config.worker_id,
            jobs_released: released,
        });
        reporter.report(WorkerEvent::Stopped {
            worker_id: &self.config.worker_id,
        });

        Ok(())
    }

    async fn fetch_and_store(&self, job: &FetchJob) -> Result<ResourceRecord, AppError> {
        let url = self.endpoints.resource(job.resource_id);
        let payload = self.fetcher.fetch(&url).await?;
        let record = ResourceRecord::from_payload(job.resource_id, payload);
        self.records.upsert(&record).await?;
        Ok(record)
    }

    async fn process_job<WR: WorkerReporter>(&self, job: &FetchJob, reporter: &WR) {
        match self.fetch_and_store(job).await {
            Ok(record) => {
                reporter.report(WorkerEvent::JobCompleted {
                    job_id: job.id,
                    resource_id: job.resource_id,
                    finished: record.finished,
                });
                if let Err(e) = self.queue.complete_job(job.id).await {
                    tracing::error!(job_id = %job.id, error = %e, "Failed to mark job completed");
                    return;
                }
                self.prune(reporter).await;
            }
            Err(e) => {
                let error_msg = e.to_string();
                let will_retry = job.can_retry() && e.is_retryable();
                reporter.report(WorkerEvent::JobFailed {
                    job_id: job.id,
                    resource_id: job.resource_id,
                    error: &error_msg,
                    will_retry,
                });

                let next_retry = will_retry
                    .then(|| job.calculate_next_retry(&self.config.retry_config));

                if let Err(e) = self.queue.fail_job(job.id, &error_msg, next_retry).await {
                    tracing::error!(job_id = %job.id, error = %e, "Failed to mark job as failed");
                    return;
                }
                if !will_retry {
                    self.prune(reporter).await;
                }
            }
        }
    }

    async fn prune<WR: WorkerReporter>(&self, reporter: &WR) {
        match self.queue.prune(&self.config.retention).await {
            Ok(0) => {}
            Ok(deleted) => reporter.report(WorkerEvent::Pruned { deleted }),
            Err(e) => tracing::warn!(error = %e, "Failed to prune terminal jobs"),
        }
    }
}
