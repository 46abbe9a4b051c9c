use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Priority given to freshly discovered resources. Lower runs first.
pub const DEFAULT_PRIORITY: i32 = 1;

/// Priority given to re-scans of resources that are already stored.
pub const RESCAN_PRIORITY: i32 = 10;

/// Status of a fetch job in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(format!("Unknown job status: {}", s)),
        }
    }
}

/// Retry configuration: a fixed delay between a bounded number of attempts.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay: TimeDelta,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay: TimeDelta::minutes(5),
        }
    }
}

impl RetryConfig {
    /// Delay before the given attempt (1-indexed). Fixed, not exponential.
    pub fn delay_for_attempt(&self, _attempt: u32) -> TimeDelta {
        self.delay
    }
}

/// How many terminal jobs to keep around for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub keep_completed: u32,
    pub keep_failed: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            keep_completed: 1000,
            keep_failed: 5000,
        }
    }
}

/// A fetch-and-persist job for one remote resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchJob {
    pub id: Uuid,
    pub resource_id: i64,
    pub priority: i32,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Failed attempts so far.
    pub attempts: u32,
    pub max_attempts: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub worker_id: Option<String>,
}

impl FetchJob {
    /// Whether a failure of the attempt in flight leaves attempts to spare.
    pub fn can_retry(&self) -> bool {
        self.attempts + 1 < self.max_attempts
    }

    pub fn calculate_next_retry(&self, config: &RetryConfig) -> DateTime<Utc> {
        let delay = config.delay_for_attempt(self.attempts + 1);
        Utc::now() + delay
    }
}

/// Request to enqueue one fetch job.
///
/// The queue does not de-duplicate: two requests for the same resource id
/// produce two jobs. Persistence is an upsert, so duplicates are harmless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueRequest {
    pub resource_id: i64,
    pub priority: i32,
    pub max_attempts: u32,
}

impl EnqueueRequest {
    pub fn new(resource_id: i64) -> Self {
        Self {
            resource_id,
            priority: DEFAULT_PRIORITY,
            max_attempts: RetryConfig::default().max_attempts,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }
}

/// Configuration for a worker process.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub poll_interval: Duration,
    pub retry_config: RetryConfig,
    pub retention: RetentionPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", &Uuid::new_v4().to_string()[..8]),
            poll_interval: Duration::from_secs(5),
            retry_config: RetryConfig::default(),
            retention: RetentionPolicy::default(),
        }
    }
}

impl WorkerConfig {
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}
