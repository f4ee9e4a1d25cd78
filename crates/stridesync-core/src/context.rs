//! Application context: every service the sync engine needs, built once
//! at process start and passed to consumers.
//!
//! There are no global singletons; "one instance per domain" falls out
//! of the context owning exactly one manager per domain.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::api::HealthApiClient;
use crate::auth::Session;
use crate::cache::CacheEventBus;
use crate::config::Config;
use crate::device::DeviceHealthStore;
use crate::managers::{ActivityManager, DataManager, ProfileManager};
use crate::sync::{SyncEvent, SyncEvents, TaskRegistry};

/// Snapshot of sync health for status surfaces.
#[derive(Debug, Clone)]
pub struct SyncStatus {
    pub activity_cache_age: String,
    pub profile_cache_age: String,
    pub pending_uploads: usize,
    pub inflight_tasks: usize,
}

/// Root object wiring the sync engine together.
pub struct AppContext {
    pub config: Config,
    pub session: Session,
    registry: Arc<TaskRegistry>,
    bus: Arc<CacheEventBus>,
    events: SyncEvents,
    pub activities: Arc<ActivityManager>,
    pub profile: Arc<ProfileManager>,
}

impl AppContext {
    pub fn new(config: Config) -> Result<Self> {
        let cache_dir = config.cache_dir()?;
        Self::with_cache_dir(config, cache_dir)
    }

    /// Build against an explicit cache directory. `new` derives the
    /// directory from the config; tests point this at a temp dir.
    pub fn with_cache_dir(config: Config, cache_dir: std::path::PathBuf) -> Result<Self> {
        debug!(?cache_dir, "Building app context");
        std::fs::create_dir_all(&cache_dir)?;

        let mut session = Session::new(cache_dir.clone());
        if let Err(e) = session.load() {
            warn!(error = %e, "Failed to load session, starting unauthenticated");
        }

        let mut api = match config.server_url.as_deref() {
            Some(url) => HealthApiClient::with_base_url(url)?,
            None => HealthApiClient::new()?,
        };
        if let Some(token) = session.token() {
            api.set_token(token.to_string());
        }

        let device = Arc::new(DeviceHealthStore::new(cache_dir.clone()));
        let registry = Arc::new(TaskRegistry::new());
        let bus = Arc::new(CacheEventBus::new());
        let events = SyncEvents::new();

        let activities = Arc::new(ActivityManager::new(
            &cache_dir,
            api.clone(),
            device,
            Arc::clone(&registry),
            events.clone(),
        )?);
        let profile = Arc::new(ProfileManager::new(
            &cache_dir,
            api,
            Arc::clone(&registry),
            events.clone(),
        )?);

        bus.register(activities.cache_handle());
        bus.register(profile.cache_handle());

        Ok(Self {
            config,
            session,
            registry,
            bus,
            events,
            activities,
            profile,
        })
    }

    /// Surface cached data for every domain immediately and kick forced
    /// refreshes into the background. Never blocks on network I/O.
    pub async fn initialize_all(&self) -> Result<()> {
        self.activities.initialize().await?;
        self.profile.initialize().await?;
        Ok(())
    }

    /// Forced refresh of every domain plus an upload drain. Returns
    /// whether any domain produced usable data.
    pub async fn refresh_all(&self) -> bool {
        let (activities_ok, profile_ok) =
            tokio::join!(self.activities.refresh_data(), self.profile.refresh_data());

        let report = self.activities.drain_uploads().await;
        if report.attempted > 0 {
            info!(
                delivered = report.delivered,
                attempted = report.attempted,
                "Drained pending uploads"
            );
        }

        activities_ok || profile_ok
    }

    /// The logout path: cancel every in-flight task, reset every
    /// manager, and fan the clear out to all registered caches.
    pub async fn clear_all_data(&self) -> Result<()> {
        info!("Clearing all data");
        self.registry.cancel_all();
        self.activities.clear_all_data().await?;
        self.profile.clear_all_data().await?;
        self.bus.broadcast_clear();
        Ok(())
    }

    /// Stale-mark caches whose id starts with `scope` so their next
    /// load refreshes; payloads survive as fallbacks.
    pub fn invalidate(&self, scope: &str) {
        self.bus.broadcast_invalidate(scope);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub async fn status(&self) -> SyncStatus {
        SyncStatus {
            activity_cache_age: self.activities.cache_age_display(),
            profile_cache_age: self.profile.cache_age_display(),
            pending_uploads: self.activities.pending_upload_count().await,
            inflight_tasks: self.registry.len(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SyncEvent;

    fn context(dir: &std::path::Path) -> AppContext {
        let config = Config {
            // Nothing listens here; remote calls fail fast
            server_url: Some("http://127.0.0.1:9".to_string()),
            ..Default::default()
        };
        AppContext::with_cache_dir(config, dir.to_path_buf()).unwrap()
    }

    #[tokio::test]
    async fn test_clear_all_data_empties_every_cache() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        ctx.activities
            .record_activity(crate::models::Activity {
                id: Some(1),
                sport: crate::models::Sport::Run,
                started_at: chrono::Utc::now(),
                duration_secs: 1200,
                distance_meters: None,
                avg_heart_rate: None,
                max_heart_rate: None,
                source: None,
            })
            .await
            .unwrap();

        let mut rx = ctx.subscribe_events();
        ctx.clear_all_data().await.unwrap();

        assert!(ctx.activities.current().is_empty());
        assert_eq!(ctx.activities.cache_age_display(), "never");
        assert_eq!(ctx.profile.cache_age_display(), "never");

        // Both domains announce the clear
        let mut cleared = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let SyncEvent::DataCleared { domain } = event {
                cleared.push(domain);
            }
        }
        assert!(cleared.contains(&"activities".to_string()));
        assert!(cleared.contains(&"profile".to_string()));
    }

    #[tokio::test]
    async fn test_invalidate_scopes_to_one_domain() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        ctx.profile
            .cache_handle()
            .clear_cache()
            .unwrap();

        // Seed both caches via the managers' write paths
        ctx.activities
            .record_activity(crate::models::Activity {
                id: Some(1),
                sport: crate::models::Sport::Run,
                started_at: chrono::Utc::now(),
                duration_secs: 1200,
                distance_meters: None,
                avg_heart_rate: None,
                max_heart_rate: None,
                source: None,
            })
            .await
            .unwrap();

        ctx.invalidate("activity");
        // Stale-marked but payload retained
        let loaded = ctx.activities.load_data().await.unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[tokio::test]
    async fn test_status_reports_queue_depth() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());

        let status = ctx.status().await;
        assert_eq!(status.pending_uploads, 0);
        assert_eq!(status.inflight_tasks, 0);
        assert_eq!(status.activity_cache_age, "never");
    }
}
