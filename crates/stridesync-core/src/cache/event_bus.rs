//! Process-wide fan-out of cache invalidation.
//!
//! Account logout and "data source changed" events need to invalidate
//! every domain cache without the managers holding references to each
//! other. Each cache registers itself once; broadcasts walk the
//! subscriber table synchronously.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use anyhow::Result;
use tracing::{debug, warn};

/// Hook the bus drives on each registered cache.
///
/// The bus only ever clears or stale-marks a subscriber; it never reads
/// or rewrites payloads.
pub trait CacheInvalidate: Send + Sync {
    fn cache_id(&self) -> &str;

    /// Remove the cached payload entirely.
    fn clear_cache(&self) -> Result<()>;

    /// Leave the payload in place but force the next load to refresh.
    fn mark_cache_stale(&self) -> Result<()>;
}

/// Registry of every cache-bearing component in the process.
///
/// Subscribers are held weakly - the bus never owns a cache's lifetime.
/// Dead entries are pruned as broadcasts walk the table.
#[derive(Default)]
pub struct CacheEventBus {
    subscribers: Mutex<Vec<Weak<dyn CacheInvalidate>>>,
}

impl CacheEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cache. Idempotent per instance: registering the same
    /// `Arc` twice keeps a single entry.
    pub fn register(&self, cache: Arc<dyn CacheInvalidate>) {
        let weak = Arc::downgrade(&cache);
        let mut subscribers = self.lock_subscribers();
        if subscribers.iter().any(|existing| existing.ptr_eq(&weak)) {
            debug!(cache = cache.cache_id(), "Cache already registered");
            return;
        }
        debug!(cache = cache.cache_id(), "Cache registered with event bus");
        subscribers.push(weak);
    }

    /// Clear every registered cache. A failing subscriber is logged and
    /// skipped; the broadcast always reaches the rest.
    pub fn broadcast_clear(&self) {
        let live = self.collect_live();
        for cache in live {
            if let Err(e) = cache.clear_cache() {
                warn!(cache = cache.cache_id(), error = %e, "Cache clear failed during broadcast");
            }
        }
    }

    /// Stale-mark every cache whose id starts with `scope`. An empty
    /// scope matches everything.
    pub fn broadcast_invalidate(&self, scope: &str) {
        let live = self.collect_live();
        for cache in live {
            if !cache.cache_id().starts_with(scope) {
                continue;
            }
            if let Err(e) = cache.mark_cache_stale() {
                warn!(cache = cache.cache_id(), error = %e, "Cache invalidate failed during broadcast");
            }
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.collect_live().len()
    }

    /// Upgrade the subscriber table, dropping entries whose cache has
    /// been torn down.
    fn collect_live(&self) -> Vec<Arc<dyn CacheInvalidate>> {
        let mut subscribers = self.lock_subscribers();
        subscribers.retain(|weak| weak.strong_count() > 0);
        subscribers.iter().filter_map(Weak::upgrade).collect()
    }

    fn lock_subscribers(&self) -> MutexGuard<'_, Vec<Weak<dyn CacheInvalidate>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ============================================================================
// Tests
// ============================================================================
