//! Optional audit trail around listing fetches.
//!
//! An entry is written only when something happened worth looking at later:
//! the fetch failed, or it turned up at least one item not seen before.
//! Quiet polls leave no trace.

use std::future::Future;

use crate::error::AppError;
use crate::models::{FetchOutcome, NewFetchLogEntry};
use crate::traits::{FetchLogStore, Fetcher};

/// A fetched body together with the items it carried.
#[derive(Debug, Clone, PartialEq)]
pub struct Observed {
    pub body: serde_json::Value,
    pub items: Vec<i64>,
    pub new_items: Vec<i64>,
    /// Items whose `is_new` check failed. They are also in `new_items`.
    pub unchecked: Vec<i64>,
}

#[derive(Clone)]
pub struct FetchAudit<F, L> {
    fetcher: F,
    log: L,
}

impl<F: Fetcher, L: FetchLogStore> FetchAudit<F, L> {
    pub fn new(fetcher: F, log: L) -> Self {
        Self { fetcher, log }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Fetch `url`, pull item ids out with `extract`, and split off the ones
    /// `is_new` accepts. An item whose check fails counts as new, so only
    /// fetch and decode errors fail the call.
    pub async fn fetch_logged<X, P, Fut>(
        &self,
        url: &str,
        extract: X,
        is_new: P,
    ) -> Result<Observed, AppError>
    where
        X: Fn(&serde_json::Value) -> Result<Vec<i64>, AppError>,
        P: Fn(i64) -> Fut,
        Fut: Future<Output = Result<bool, AppError>>,
    {
        match self.observe(url, extract, is_new).await {
            Ok(observed) => {
                if !observed.new_items.is_empty() {
                    self.write(NewFetchLogEntry {
                        url: url.to_string(),
                        outcome: FetchOutcome::Ok,
                        items_observed: count(observed.items.len()),
                        items_new: count(observed.new_items.len()),
                        error_message: None,
                    })
                    .await;
                }
                Ok(observed)
            }
            Err(e) => {
                self.write(NewFetchLogEntry {
                    url: url.to_string(),
                    outcome: FetchOutcome::Error,
                    items_observed: 0,
                    items_new: 0,
                    error_message: Some(e.to_string()),
                })
                .await;
                Err(e)
            }
        }
    }

    async fn observe<X, P, Fut>(&self, url: &str, extract: X, is_new: P) -> Result<Observed, AppError>
    where
        X: Fn(&serde_json::Value) -> Result<Vec<i64>, AppError>,
        P: Fn(i64) -> Fut,
        Fut: Future<Output = Result<bool, AppError>>,
    {
        let body = self.fetcher.fetch(url).await?;
        let items = extract(&body)?;

        let mut new_items = Vec::new();
        let mut unchecked = Vec::new();
        for &item in &items {
            match is_new(item).await {
                Ok(true) => new_items.push(item),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(%url, item, error = %e, "Could not check item, treating it as new");
                    new_items.push(item);
                    unchecked.push(item);
                }
            }
        }

        Ok(Observed {
            body,
            items,
            new_items,
            unchecked,
        })
    }

    async fn write(&self, entry: NewFetchLogEntry) {
        if let Err(e) = self.log.record(&entry).await {
            tracing::warn!(url = %entry.url, error = %e, "Failed to write fetch log entry");
        }
    }
}

fn count(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

/// Read a JSON array of integer ids.
pub fn id_list(body: &serde_json::Value) -> Result<Vec<i64>, AppError> {
    Ok(serde_json::from_value(body.clone())?)
}
