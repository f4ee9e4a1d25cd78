//! The lifecycle contract every domain manager implements, plus the
//! ordered fallback chain they share.
//!
//! The fallback order is fixed: remote, then stale cache, then the
//! on-device store. The result is tagged with the source that satisfied
//! it so the decision stays auditable.

use std::future::Future;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::CacheStore;

/// Lifecycle every domain manager exposes.
///
/// `initialize` must never block its caller on network I/O: it surfaces
/// whatever is cached and kicks the forced refresh into the background.
/// `clear_all_data` is the one operation whose effect must be observable
/// immediately, with no background step.
#[async_trait]
pub trait DataManager {
    type Payload;

    /// Surface cached data immediately, then refresh in the background.
    async fn initialize(&self) -> Result<()>;

    /// Cache-first load with remote/stale/device fallback.
    async fn load_data(&self) -> Result<Self::Payload>;

    /// Forced refresh bypassing TTL. Returns whether usable data was
    /// produced.
    async fn refresh_data(&self) -> bool;

    /// Reset published state to default and clear the cache.
    async fn clear_all_data(&self) -> Result<()>;
}

/// Which source satisfied a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataOrigin {
    Remote,
    FreshCache,
    StaleCache,
    Device,
}

/// A payload tagged with the source that produced it.
#[derive(Debug, Clone)]
pub struct Loaded<T> {
    pub payload: T,
    pub origin: DataOrigin,
}

/// No cache, no remote, no device fallback. The only load failure that
/// reaches a caller.
#[derive(Debug, Error)]
#[error("no data available from any source")]
pub struct NoDataError;

/// Cache-first read: a valid cache entry short-circuits everything,
/// otherwise the remote/stale/device chain runs.
pub async fn load_cache_first<T, R, D>(
    cache: &CacheStore<T>,
    fetch_remote: R,
    fetch_device: Option<D>,
) -> Result<Loaded<T>>
where
    T: Serialize + DeserializeOwned,
    R: Future<Output = Result<T>>,
    D: Future<Output = Result<T>>,
{
    if !cache.should_refresh() {
        if let Some(payload) = cache.load() {
            debug!(cache = cache.id(), "Serving fresh cache entry");
            return Ok(Loaded {
                payload,
                origin: DataOrigin::FreshCache,
            });
        }
        // Timestamp is fresh but the record is unreadable - fall through
        // and treat it as a miss.
    }
    refresh_with_fallback(cache, fetch_remote, fetch_device).await
}

/// Remote fetch with write-through, falling back to stale cache and
/// then the device store when the remote fails.
pub async fn refresh_with_fallback<T, R, D>(
    cache: &CacheStore<T>,
    fetch_remote: R,
    fetch_device: Option<D>,
) -> Result<Loaded<T>>
where
    T: Serialize + DeserializeOwned,
    R: Future<Output = Result<T>>,
    D: Future<Output = Result<T>>,
{
    let remote_err = match fetch_remote.await {
        Ok(payload) => {
            // A failed write-through must not fail the load itself
            if let Err(e) = cache.save(&payload) {
                warn!(cache = cache.id(), error = %e, "Write-through failed");
            }
            return Ok(Loaded {
                payload,
                origin: DataOrigin::Remote,
            });
        }
        Err(e) => e,
    };
    warn!(cache = cache.id(), error = %remote_err, "Remote fetch failed, falling back");

    if let Some(payload) = cache.load() {
        return Ok(Loaded {
            payload,
            origin: DataOrigin::StaleCache,
        });
    }

    if let Some(fetch_device) = fetch_device {
        match fetch_device.await {
            Ok(payload) => {
                return Ok(Loaded {
                    payload,
                    origin: DataOrigin::Device,
                })
            }
            Err(e) => warn!(error = %e, "Device fallback failed"),
        }
    }

    Err(NoDataError.into())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    type Payload = Vec<String>;

    fn store(dir: &std::path::Path, ttl_secs: i64) -> CacheStore<Payload> {
        CacheStore::new(dir.to_path_buf(), "test_cache", Duration::seconds(ttl_secs)).unwrap()
    }

    fn no_device() -> Option<std::future::Ready<Result<Payload>>> {
        None
    }

    #[tokio::test]
    async fn test_fresh_cache_skips_remote() {
        let dir = tempfile::tempdir().unwrap();
        let cache = store(dir.path(), 1800);
        cache.save(&vec!["cached".to_string()]).unwrap();

        let remote_called = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&remote_called);
        let loaded = load_cache_first(
            &cache,
            async move {
                flag.store(true, Ordering::SeqCst);
                Ok(vec!["remote".to_string()])
            },
            no_device(),
        )
        .await
        .unwrap();

        assert_eq!(loaded.origin, DataOrigin::FreshCache);
        assert_eq!(loaded.payload, vec!["cached".to_string()]);
        assert!(!remote_called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_remote_writes_through() {
        let dir = tempfile::tempdir().unwrap();
        let cache = store(dir.path(), 1800);

        let loaded = load_cache_first(
            &cache,
            async { Ok(vec!["remote".to_string()]) },
            no_device(),
        )
        .await
        .unwrap();

        assert_eq!(loaded.origin, DataOrigin::Remote);
        assert_eq!(cache.load(), Some(vec!["remote".to_string()]));
        assert!(!cache.should_refresh());
    }

    #[tokio::test]
    async fn test_stale_cache_beats_device() {
        let dir = tempfile::tempdir().unwrap();
        let cache = store(dir.path(), 1800);
        cache.save(&vec!["stale".to_string()]).unwrap();
        cache.mark_stale().unwrap();

        let loaded = load_cache_first(
            &cache,
            async { Err(anyhow::anyhow!("server unreachable")) },
            Some(async { Ok(vec!["device".to_string()]) }),
        )
        .await
        .unwrap();

        assert_eq!(loaded.origin, DataOrigin::StaleCache);
        assert_eq!(loaded.payload, vec!["stale".to_string()]);
    }

    #[tokio::test]
    async fn test_device_fallback_when_no_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = store(dir.path(), 1800);

        let loaded = load_cache_first(
            &cache,
            async { Err(anyhow::anyhow!("server unreachable")) },
            Some(async { Ok(vec!["device".to_string()]) }),
        )
        .await
        .unwrap();

        assert_eq!(loaded.origin, DataOrigin::Device);
        // Device data is a fallback, not a write-through
        assert_eq!(cache.load(), None);
    }

    #[tokio::test]
    async fn test_no_source_yields_no_data_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = store(dir.path(), 1800);

        let result = load_cache_first(
            &cache,
            async { Err(anyhow::anyhow!("server unreachable")) },
            Some(async { Err(anyhow::anyhow!("sensors denied")) }),
        )
        .await;

        let err = result.unwrap_err();
        assert!(err.downcast_ref::<NoDataError>().is_some());
    }
}
