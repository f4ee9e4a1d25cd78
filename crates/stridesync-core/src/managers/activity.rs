//! Domain manager for recorded activities.
//!
//! Composes the whole sync stack: TTL cache, task registry, remote
//! client, device fallback, and the durable upload queue. UI-facing
//! consumers observe state through a watch channel and the sync event
//! bus rather than calling into the manager.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::api::HealthApiClient;
use crate::cache::{CacheInvalidate, CacheStore};
use crate::device::DeviceDataSource;
use crate::managers::lifecycle::{load_cache_first, DataManager, DataOrigin};
use crate::models::{Activity, ActivitySummary, DateRange};
use crate::sync::retry_queue::{default_max_age, DEFAULT_MAX_RETRIES};
use crate::sync::{DrainReport, RetryQueue, SyncEvents, TaskError, TaskRegistry};

// ============================================================================
// Constants
// ============================================================================

/// Event/domain name for this manager
const DOMAIN: &str = "activities";

/// Cache identifier; also the key prefix scoped invalidations match on
const CACHE_ID: &str = "activity_cache";

/// Activity cache TTL in seconds.
/// Activities change often (every workout), so 30 minutes keeps lists
/// current without refetching on every screen visit.
const ACTIVITY_TTL_SECS: i64 = 1800;

/// File name of the persisted upload queue
const UPLOAD_QUEUE: &str = "pending_uploads";

/// Number of days of history to sync.
/// 30 days covers the training views without overwhelming first sync.
const SYNC_LOOKBACK_DAYS: i64 = 30;

/// Task registry keys. One key per lifecycle operation so concurrent
/// UI-triggered calls collapse into a single execution.
const INIT_KEY: &str = "activities.init";
const LOAD_KEY: &str = "activities.load";
const REFRESH_KEY: &str = "activities.refresh";
const CLEAR_KEY: &str = "activities.clear";
const DRAIN_KEY: &str = "activities.drain";

/// Manager for the athlete's recorded workouts.
pub struct ActivityManager {
    api: HealthApiClient,
    device: Arc<dyn DeviceDataSource>,
    registry: Arc<TaskRegistry>,
    cache: Arc<CacheStore<Vec<Activity>>>,
    uploads: Arc<RetryQueue<Activity>>,
    events: SyncEvents,
    state: Arc<watch::Sender<Vec<Activity>>>,
}

impl ActivityManager {
    pub fn new(
        cache_dir: &Path,
        api: HealthApiClient,
        device: Arc<dyn DeviceDataSource>,
        registry: Arc<TaskRegistry>,
        events: SyncEvents,
    ) -> Result<Self> {
        let cache = Arc::new(CacheStore::new(
            cache_dir.to_path_buf(),
            CACHE_ID,
            Duration::seconds(ACTIVITY_TTL_SECS),
        )?);
        let uploads = Arc::new(RetryQueue::open(
            cache_dir.to_path_buf(),
            UPLOAD_QUEUE,
            DEFAULT_MAX_RETRIES,
        )?);
        let (state, _) = watch::channel(Vec::new());

        Ok(Self {
            api,
            device,
            registry,
            cache,
            uploads,
            events,
            state: Arc::new(state),
        })
    }

    /// The rolling window a sync covers.
    fn sync_range() -> DateRange {
        DateRange::last_days(SYNC_LOOKBACK_DAYS)
    }

    /// Watch the published activity list.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Activity>> {
        self.state.subscribe()
    }

    /// Snapshot of the currently published activities.
    pub fn current(&self) -> Vec<Activity> {
        self.state.borrow().clone()
    }

    pub fn summary(&self) -> ActivitySummary {
        ActivitySummary::from_activities(&self.state.borrow())
    }

    /// Handle for event-bus registration.
    pub fn cache_handle(&self) -> Arc<dyn CacheInvalidate> {
        Arc::clone(&self.cache) as Arc<dyn CacheInvalidate>
    }

    pub fn cache_age_display(&self) -> String {
        self.cache.age_display()
    }

    pub async fn pending_upload_count(&self) -> usize {
        self.uploads.len().await
    }

    /// Kick off a forced refresh without blocking the caller.
    pub fn spawn_background_refresh(&self) {
        let registry = Arc::clone(&self.registry);
        let api = self.api.clone();
        let cache = Arc::clone(&self.cache);
        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        tokio::spawn(async move {
            Self::run_refresh(registry, api, cache, state, events).await;
        });
    }

    /// Forced refresh: always hits the remote, bypassing TTL. The last
    /// writer to reach the cache wins when a background refresh races a
    /// foreground one.
    async fn run_refresh(
        registry: Arc<TaskRegistry>,
        api: HealthApiClient,
        cache: Arc<CacheStore<Vec<Activity>>>,
        state: Arc<watch::Sender<Vec<Activity>>>,
        events: SyncEvents,
    ) -> bool {
        let op_cache = Arc::clone(&cache);
        let outcome = registry
            .run(REFRESH_KEY, async move {
                let activities = api.fetch_activities(&Self::sync_range()).await?;
                if let Err(e) = op_cache.force_refresh(&activities) {
                    warn!(error = %e, "Write-through failed after forced refresh");
                }
                Ok(activities)
            })
            .await;

        match outcome {
            Ok(activities) => {
                state.send_replace((*activities).clone());
                events.data_changed(DOMAIN);
                true
            }
            Err(TaskError::Cancelled) => {
                debug!("Activity refresh cancelled");
                false
            }
            Err(TaskError::Failed(e)) => {
                warn!(error = %e, "Activity refresh failed");
                false
            }
        }
    }

    /// Record a manually entered activity.
    ///
    /// The activity is published and cached immediately; a failed upload
    /// lands in the durable queue and is retried by the next drain.
    pub async fn record_activity(&self, activity: Activity) -> Result<()> {
        let mut current = self.state.borrow().clone();
        current.push(activity.clone());
        if let Err(e) = self.cache.save(&current) {
            warn!(error = %e, "Failed to cache recorded activity");
        }
        self.state.send_replace(current);

        match self.api.upload_activity(&activity).await {
            Ok(ack) => {
                debug!(activity_id = ack.activity_id, duplicate = ack.duplicate, "Activity uploaded");
            }
            Err(e) => {
                warn!(error = %e, "Upload failed, queueing for retry");
                self.uploads.enqueue(activity).await?;
            }
        }

        self.events.data_changed(DOMAIN);
        Ok(())
    }

    /// One pass over the upload queue. Safe to trigger from both the
    /// foreground and a background scheduler; overlapping calls collapse
    /// through the registry.
    pub async fn drain_uploads(&self) -> DrainReport {
        let uploads = Arc::clone(&self.uploads);
        let api = self.api.clone();
        let outcome = self
            .registry
            .run(DRAIN_KEY, async move {
                uploads.purge_expired(default_max_age()).await;
                let report = uploads
                    .drain(|activity| {
                        let api = api.clone();
                        async move { api.upload_activity(&activity).await.map(|_| ()) }
                    })
                    .await;
                Ok(report)
            })
            .await;

        match outcome {
            Ok(report) => *report,
            Err(TaskError::Cancelled) => {
                debug!("Upload drain cancelled");
                DrainReport::default()
            }
            Err(TaskError::Failed(e)) => {
                warn!(error = %e, "Upload drain failed");
                DrainReport::default()
            }
        }
    }
}

#[async_trait]
impl DataManager for ActivityManager {
    type Payload = Vec<Activity>;

    async fn initialize(&self) -> Result<()> {
        let cache = Arc::clone(&self.cache);
        let state = Arc::clone(&self.state);
        let outcome = self
            .registry
            .run(INIT_KEY, async move {
                if let Some(cached) = cache.load() {
                    debug!(count = cached.len(), "Publishing cached activities");
                    state.send_replace(cached);
                }
                Ok(())
            })
            .await;
        if let Err(TaskError::Failed(e)) = outcome {
            warn!(error = %e, "Activity initialize failed");
        }
        self.spawn_background_refresh();
        Ok(())
    }

    async fn load_data(&self) -> Result<Vec<Activity>> {
        let cache = Arc::clone(&self.cache);
        let api = self.api.clone();
        let device = Arc::clone(&self.device);
        let outcome = self
            .registry
            .run(LOAD_KEY, async move {
                let range = Self::sync_range();
                load_cache_first(
                    &cache,
                    async move { api.fetch_activities(&range).await },
                    Some(async move { device.fetch_local(&range).await }),
                )
                .await
            })
            .await;

        match outcome {
            Ok(loaded) => {
                debug!(origin = ?loaded.origin, count = loaded.payload.len(), "Activities loaded");
                self.state.send_replace(loaded.payload.clone());
                if loaded.origin == DataOrigin::Remote {
                    self.events.data_changed(DOMAIN);
                }
                Ok(loaded.payload.clone())
            }
            Err(TaskError::Cancelled) => {
                // Teardown raced the load; the current snapshot is the
                // best non-error answer.
                debug!("Activity load cancelled");
                Ok(self.current())
            }
            Err(TaskError::Failed(e)) => Err(anyhow::anyhow!("failed to load activities: {e}")),
        }
    }

    async fn refresh_data(&self) -> bool {
        Self::run_refresh(
            Arc::clone(&self.registry),
            self.api.clone(),
            Arc::clone(&self.cache),
            Arc::clone(&self.state),
            self.events.clone(),
        )
        .await
    }

    async fn clear_all_data(&self) -> Result<()> {
        let cache = Arc::clone(&self.cache);
        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        let outcome = self
            .registry
            .run(CLEAR_KEY, async move {
                state.send_replace(Vec::new());
                cache.clear()?;
                events.data_cleared(DOMAIN);
                Ok(())
            })
            .await;
        match outcome {
            Ok(_) | Err(TaskError::Cancelled) => Ok(()),
            Err(TaskError::Failed(e)) => Err(anyhow::anyhow!("failed to clear activities: {e}")),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Sport;
    use crate::sync::SyncEvent;
    use chrono::Utc;

    /// Nothing listens on this port, so remote calls fail fast with a
    /// connection error - the offline path, deterministically.
    const UNREACHABLE: &str = "http://127.0.0.1:9";

    struct FakeDevice {
        activities: Vec<Activity>,
    }

    #[async_trait]
    impl DeviceDataSource for FakeDevice {
        fn is_available(&self) -> bool {
            true
        }

        async fn fetch_local(&self, _range: &DateRange) -> Result<Vec<Activity>> {
            Ok(self.activities.clone())
        }
    }

    fn activity(id: i64) -> Activity {
        Activity {
            id: Some(id),
            sport: Sport::Run,
            started_at: Utc::now(),
            duration_secs: 1800,
            distance_meters: Some(6000.0),
            avg_heart_rate: Some(150),
            max_heart_rate: None,
            source: Some("device".to_string()),
        }
    }

    fn manager(dir: &Path, device_activities: Vec<Activity>) -> ActivityManager {
        ActivityManager::new(
            dir,
            HealthApiClient::with_base_url(UNREACHABLE).unwrap(),
            Arc::new(FakeDevice {
                activities: device_activities,
            }),
            Arc::new(TaskRegistry::new()),
            SyncEvents::new(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_load_falls_back_to_device_offline() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path(), vec![activity(1), activity(2)]);

        let loaded = mgr.load_data().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(mgr.current().len(), 2);
    }

    #[tokio::test]
    async fn test_load_serves_cached_data_offline() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mgr = manager(dir.path(), Vec::new());
            mgr.record_activity(activity(7)).await.unwrap();
        }

        // Fresh manager, same cache dir: cached payload survives
        let mgr = manager(dir.path(), Vec::new());
        let loaded = mgr.load_data().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, Some(7));
    }

    #[tokio::test]
    async fn test_failed_upload_is_queued_and_retried() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path(), Vec::new());

        mgr.record_activity(activity(1)).await.unwrap();
        assert_eq!(mgr.pending_upload_count().await, 1);

        // Server still unreachable: item stays queued with one more retry
        let report = mgr.drain_uploads().await;
        assert_eq!(report.attempted, 1);
        assert_eq!(report.delivered, 0);
        assert_eq!(mgr.pending_upload_count().await, 1);

        // Retries 2 and 3 exhaust the budget
        mgr.drain_uploads().await;
        let last = mgr.drain_uploads().await;
        assert_eq!(last.dropped, 1);
        assert_eq!(mgr.pending_upload_count().await, 0);
    }

    #[tokio::test]
    async fn test_refresh_fails_offline_without_clearing_state() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path(), vec![activity(1)]);
        mgr.load_data().await.unwrap();
        assert_eq!(mgr.current().len(), 1);

        assert!(!mgr.refresh_data().await);
        // Failed refresh leaves the published state alone
        assert_eq!(mgr.current().len(), 1);
    }

    #[tokio::test]
    async fn test_clear_all_data_is_immediate() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path(), vec![activity(1)]);
        mgr.load_data().await.unwrap();

        let mut rx = mgr.events.subscribe();
        mgr.clear_all_data().await.unwrap();

        assert!(mgr.current().is_empty());
        assert!(mgr.cache.load().is_none());
        assert_eq!(
            rx.recv().await.unwrap(),
            SyncEvent::DataCleared {
                domain: "activities".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_cancelled_load_is_absorbed() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(TaskRegistry::new());
        let mgr = ActivityManager::new(
            dir.path(),
            HealthApiClient::with_base_url(UNREACHABLE).unwrap(),
            Arc::new(FakeDevice {
                activities: Vec::new(),
            }),
            Arc::clone(&registry),
            SyncEvents::new(),
        )
        .unwrap();

        // Occupy the load key with a task that never finishes, then
        // cancel while a caller is attached.
        let blocker = Arc::clone(&registry);
        tokio::spawn(async move {
            let _ = blocker
                .run("activities.load", async {
                    tokio::time::sleep(std::time::Duration::from_secs(30)).await;
                    Ok(crate::managers::lifecycle::Loaded {
                        payload: Vec::<Activity>::new(),
                        origin: DataOrigin::Remote,
                    })
                })
                .await;
        });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let load = tokio::spawn(async move { mgr.load_data().await });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        registry.cancel_all();

        // Cancellation is a non-error outcome
        let result = load.await.unwrap();
        assert!(result.unwrap().is_empty());
    }
}
