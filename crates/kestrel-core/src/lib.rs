pub mod audit;
pub mod backoff;
pub mod circuit_gate;
pub mod config;
pub mod discovery;
pub mod endpoints;
pub mod error;
pub mod job;
pub mod job_queue;
pub mod models;
pub mod pipeline;
pub mod rate_limiter;
pub mod shared_store;
pub mod traits;
pub mod worker;


pub use audit::FetchAudit;
pub use config::PipelineConfig;
pub use discovery::{DiscoveryConfig, DiscoveryCrawler, DiscoveryReport};
pub use endpoints::Endpoints;
pub use error::AppError;
pub use job::{EnqueueRequest, FetchJob, JobStatus, RetentionPolicy, WorkerConfig};
pub use job_queue::JobQueue;
pub use pipeline::FetchPipeline;
pub use shared_store::{MemoryStore, SharedStore};
pub use traits::{FetchLogStore, Fetcher, Notifier, RecordStore, Transport};
pub use worker::{TracingWorkerReporter, WorkerService};
