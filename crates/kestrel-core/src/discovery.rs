//! Backward pagination over the upstream listing.
//!
//! The listing returns ids below a bound in descending order. A pass starts
//! at the seed (or the newest page), enqueues every id persistence does not
//! know yet, and moves the cursor down to the smallest id on each page until
//! a page comes back empty.

use serde::Serialize;

use crate::audit::{FetchAudit, id_list};
use crate::endpoints::Endpoints;
use crate::error::AppError;
use crate::job::{DEFAULT_PRIORITY, EnqueueRequest, RESCAN_PRIORITY};
use crate::job_queue::JobQueue;
use crate::traits::{FetchLogStore, Fetcher, Notifier, RecordStore};

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Exclusive upper bound for the first page. `None` starts at the newest.
    pub seed_max_id: Option<i64>,
    pub priority: i32,
    pub rescan_priority: i32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            seed_max_id: None,
            priority: DEFAULT_PRIORITY,
            rescan_priority: RESCAN_PRIORITY,
        }
    }
}

impl DiscoveryConfig {
    pub fn with_seed(mut self, seed_max_id: Option<i64>) -> Self {
        self.seed_max_id = seed_max_id;
        self
    }
}

/// Counters for one discovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryReport {
    pub pages: u32,
    /// Ids returned by the listing.
    pub discovered: usize,
    pub queued: usize,
    /// Ids persistence already knew.
    pub skipped: usize,
    /// Ids that could not be enqueued.
    pub failed: usize,
    /// Smallest id seen so far.
    pub cursor: Option<i64>,
    /// False when the pass stopped before reaching an empty page.
    pub completed: bool,
}

impl DiscoveryReport {
    pub fn summary(&self) -> String {
        format!(
            "Discovery found {} new resources ({} listed, {} already known, {} failed to queue) over {} pages",
            self.queued, self.discovered, self.skipped, self.failed, self.pages
        )
    }
}

pub struct DiscoveryCrawler<F, R, Q, L, N>
where
    F: Fetcher,
    R: RecordStore,
    Q: JobQueue,
    L: FetchLogStore,
    N: Notifier,
{
    audit: FetchAudit<F, L>,
    records: R,
    queue: Q,
    notifier: N,
    endpoints: Endpoints,
    config: DiscoveryConfig,
}

impl<F, R, Q, L, N> DiscoveryCrawler<F, R, Q, L, N>
where
    F: Fetcher,
    R: RecordStore,
    Q: JobQueue,
    L: FetchLogStore,
    N: Notifier,
{
    pub fn new(
        audit: FetchAudit<F, L>,
        records: R,
        queue: Q,
        notifier: N,
        endpoints: Endpoints,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            audit,
            records,
            queue,
            notifier,
            endpoints,
            config,
        }
    }

    /// Run one full pass. Page-fetch failures end the pass early; the
    /// partial report is returned either way.
    pub async fn run(&self) -> DiscoveryReport {
        let mut report = DiscoveryReport {
            cursor: self.config.seed_max_id,
            ..DiscoveryReport::default()
        };

        loop {
            let url = self.endpoints.listing(report.cursor);
            let records = self.records.clone();
            let observed = match self
                .audit
                .fetch_logged(&url, id_list, move |id| {
                    let records = records.clone();
                    async move { records.exists(id).await.map(|known| !known) }
                })
                .await
            {
                Ok(observed) => observed,
                Err(e) if e.is_upstream() => {
                    tracing::warn!(%url, error = %e, "Listing fetch failed, ending discovery pass");
                    break;
                }
                Err(e) => {
                    tracing::error!(%url, error = %e, "Discovery pass aborted");
                    break;
                }
            };

            report.pages += 1;
            let Some(page_min) = observed.items.iter().copied().min() else {
                report.completed = true;
                break;
            };

            if !observed.unchecked.is_empty() {
                tracing::warn!(
                    %url,
                    ids = ?observed.unchecked,
                    "Known-resource check failed, queueing anyway"
                );
            }

            report.discovered += observed.items.len();
            report.skipped += observed.items.len() - observed.new_items.len();
            self.enqueue_page(&observed.new_items, &mut report).await;

            if report.cursor.is_some_and(|cursor| page_min >= cursor) {
                tracing::warn!(
                    cursor = ?report.cursor,
                    page_min,
                    "Listing page made no progress, ending discovery pass"
                );
                break;
            }
            report.cursor = Some(page_min);

            tracing::debug!(
                page = report.pages,
                cursor = page_min,
                new = observed.new_items.len(),
                "Discovery page processed"
            );
        }

        tracing::info!(
            pages = report.pages,
            discovered = report.discovered,
            queued = report.queued,
            skipped = report.skipped,
            failed = report.failed,
            cursor = ?report.cursor,
            completed = report.completed,
            "Discovery pass finished"
        );

        if report.queued > 0 {
            if let Err(e) = self.notifier.notify(&report.summary()).await {
                tracing::warn!(error = %e, "Failed to send discovery notification");
            }
        }

        report
    }

    /// Bulk-enqueue, falling back to one id at a time so a single bad
    /// insert doesn't lose the whole page.
    async fn enqueue_page(&self, ids: &[i64], report: &mut DiscoveryReport) {
        if ids.is_empty() {
            return;
        }

        let requests: Vec<_> = ids
            .iter()
            .map(|&id| EnqueueRequest::new(id).with_priority(self.config.priority))
            .collect();

        match self.queue.enqueue_bulk(&requests).await {
            Ok(_) => {
                report.queued += requests.len();
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, count = requests.len(), "Bulk enqueue failed, retrying one by one");
            }
        }

        for request in requests {
            match self.queue.enqueue(request).await {
                Ok(_) => report.queued += 1,
                Err(e) => {
                    tracing::warn!(resource_id = request.resource_id, error = %e, "Failed to enqueue resource");
                    report.failed += 1;
                }
            }
        }
    }

    /// Re-enqueue up to `limit` known resources the remote still reports as
    /// open. Returns how many jobs were queued.
    pub async fn rescan(&self, limit: usize) -> Result<u64, AppError> {
        let ids = self.records.unfinished_ids(limit).await?;
        if ids.is_empty() {
            tracing::info!("No unfinished resources to rescan");
            return Ok(0);
        }

        let requests: Vec<_> = ids
            .iter()
            .map(|&id| EnqueueRequest::new(id).with_priority(self.config.rescan_priority))
            .collect();
        let queued = self.queue.enqueue_bulk(&requests).await?;

        tracing::info!(queued, priority = self.config.rescan_priority, "Rescan queued");
        Ok(queued)
    }
}
