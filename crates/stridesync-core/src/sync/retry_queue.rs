//! Durable retry queue for operations that failed against the remote
//! service.
//!
//! Typically these are activity uploads recorded while offline. Items
//! carry a retry counter and a creation timestamp; a drain attempts every
//! pending item and an item leaves the queue on success, on exhausting
//! its retries, or on aging out.

use std::future::Future;
use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

/// Retry budget per item.
/// 3 attempts catches flaky connectivity without hammering a dead endpoint.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Items older than this are garbage collected regardless of retry count.
const MAX_ITEM_AGE_DAYS: i64 = 7;

/// Maximum age before an item is purged, independent of its retries.
pub fn default_max_age() -> Duration {
    Duration::days(MAX_ITEM_AGE_DAYS)
}

/// One operation waiting to be retried.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingOperation<P> {
    pub id: Uuid,
    pub payload: P,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
}

/// Result of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Items delivered and removed this pass.
    pub delivered: usize,
    /// Items attempted this pass.
    pub attempted: usize,
    /// Items dropped permanently after exhausting their retries.
    pub dropped: usize,
}

/// Durable, single-writer queue of pending operations.
///
/// The queue is persisted as one ordered JSON list. Every successful
/// upload removes its own item and persists before the next attempt, so
/// overlapping drains (foreground trigger plus background scheduler)
/// never deliver an item twice.
pub struct RetryQueue<P> {
    path: PathBuf,
    max_retries: u32,
    items: tokio::sync::Mutex<Vec<PendingOperation<P>>>,
}

impl<P> RetryQueue<P>
where
    P: Serialize + DeserializeOwned + Clone,
{
    /// Open (or create) the queue persisted at `<dir>/<name>.json`.
    pub fn open(dir: PathBuf, name: &str, max_retries: u32) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.json", name));
        let items = Self::read_items(&path);
        Ok(Self {
            path,
            max_retries,
            items: tokio::sync::Mutex::new(items),
        })
    }

    /// A corrupt or missing persisted list starts the queue empty - the
    /// same treatment a corrupt cache record gets.
    fn read_items(path: &PathBuf) -> Vec<PendingOperation<P>> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };
        match serde_json::from_str(&contents) {
            Ok(items) => items,
            Err(e) => {
                warn!(?path, error = %e, "Corrupt retry queue, starting empty");
                Vec::new()
            }
        }
    }

    fn persist(&self, items: &[PendingOperation<P>]) -> Result<()> {
        let contents = serde_json::to_string_pretty(items)?;
        std::fs::write(&self.path, contents)?;
        Ok(())
    }

    /// Add a failed operation to the queue.
    pub async fn enqueue(&self, payload: P) -> Result<()> {
        let mut items = self.items.lock().await;
        items.push(PendingOperation {
            id: Uuid::new_v4(),
            payload,
            retry_count: 0,
            created_at: Utc::now(),
        });
        self.persist(&items)?;
        debug!(pending = items.len(), "Operation queued for retry");
        Ok(())
    }

    /// Attempt to deliver every pending item.
    ///
    /// Success removes the item (persisted before the next attempt).
    /// Failure increments its retry counter; an item that reaches the
    /// retry budget is dropped permanently and logged - the only
    /// deliberate data-loss path in the sync engine.
    pub async fn drain<F, Fut>(&self, upload_fn: F) -> DrainReport
    where
        F: Fn(P) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let snapshot: Vec<(Uuid, P)> = {
            let items = self.items.lock().await;
            items
                .iter()
                .map(|item| (item.id, item.payload.clone()))
                .collect()
        };

        let mut report = DrainReport::default();
        for (id, payload) in snapshot {
            // A concurrent drain may have delivered this item already
            if !self.contains(id).await {
                continue;
            }
            report.attempted += 1;

            match upload_fn(payload).await {
                Ok(()) => {
                    self.remove(id).await;
                    report.delivered += 1;
                }
                Err(e) => {
                    if self.record_failure(id).await {
                        report.dropped += 1;
                    } else {
                        debug!(%id, error = %e, "Upload failed, keeping queued");
                    }
                }
            }
        }

        if report.attempted > 0 {
            debug!(
                delivered = report.delivered,
                attempted = report.attempted,
                dropped = report.dropped,
                "Retry queue drained"
            );
        }
        report
    }

    /// Remove items whose age exceeds `max_age`, regardless of their
    /// retry count. Returns the number removed.
    pub async fn purge_expired(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let mut items = self.items.lock().await;
        let before = items.len();
        items.retain(|item| {
            if item.created_at < cutoff {
                warn!(id = %item.id, created_at = %item.created_at, "Dropping expired pending operation");
                false
            } else {
                true
            }
        });
        let removed = before - items.len();
        if removed > 0 {
            if let Err(e) = self.persist(&items) {
                warn!(error = %e, "Failed to persist retry queue after purge");
            }
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    async fn contains(&self, id: Uuid) -> bool {
        self.items.lock().await.iter().any(|item| item.id == id)
    }

    async fn remove(&self, id: Uuid) {
        let mut items = self.items.lock().await;
        items.retain(|item| item.id != id);
        if let Err(e) = self.persist(&items) {
            warn!(error = %e, "Failed to persist retry queue after removal");
        }
    }

    /// Increment the item's retry counter, dropping it permanently once
    /// the budget is exhausted. Returns true if the item was dropped.
    async fn record_failure(&self, id: Uuid) -> bool {
        let mut items = self.items.lock().await;
        let mut dropped = false;
        if let Some(item) = items.iter_mut().find(|item| item.id == id) {
            item.retry_count += 1;
            if item.retry_count >= self.max_retries {
                warn!(
                    %id,
                    retries = item.retry_count,
                    "Dropping operation after exhausting retries"
                );
                dropped = true;
            }
        }
        if dropped {
            items.retain(|item| item.id != id);
        }
        if let Err(e) = self.persist(&items) {
            warn!(error = %e, "Failed to persist retry queue after failure");
        }
        dropped
    }
}

// ============================================================================
// Tests
// ============================================================================
