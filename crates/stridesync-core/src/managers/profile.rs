//! Domain manager for the athlete profile.
//!
//! Profile data changes rarely, so it carries a longer TTL and no
//! device fallback - a stale profile is still a usable profile.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::api::HealthApiClient;
use crate::cache::{CacheInvalidate, CacheStore};
use crate::managers::lifecycle::{load_cache_first, DataManager, DataOrigin};
use crate::models::UserProfile;
use crate::sync::{SyncEvents, TaskError, TaskRegistry};

/// Event/domain name for this manager
const DOMAIN: &str = "profile";

/// Cache identifier
const CACHE_ID: &str = "profile_cache";

/// Profile cache TTL in seconds.
/// Settings and targets change rarely; an hour is plenty.
const PROFILE_TTL_SECS: i64 = 3600;

const INIT_KEY: &str = "profile.init";
const LOAD_KEY: &str = "profile.load";
const REFRESH_KEY: &str = "profile.refresh";
const CLEAR_KEY: &str = "profile.clear";

/// Manager for athlete settings and training targets.
pub struct ProfileManager {
    api: HealthApiClient,
    registry: Arc<TaskRegistry>,
    cache: Arc<CacheStore<UserProfile>>,
    events: SyncEvents,
    state: Arc<watch::Sender<UserProfile>>,
}

impl ProfileManager {
    pub fn new(
        cache_dir: &Path,
        api: HealthApiClient,
        registry: Arc<TaskRegistry>,
        events: SyncEvents,
    ) -> Result<Self> {
        let cache = Arc::new(CacheStore::new(
            cache_dir.to_path_buf(),
            CACHE_ID,
            Duration::seconds(PROFILE_TTL_SECS),
        )?);
        let (state, _) = watch::channel(UserProfile::default());

        Ok(Self {
            api,
            registry,
            cache,
            events,
            state: Arc::new(state),
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<UserProfile> {
        self.state.subscribe()
    }

    pub fn current(&self) -> UserProfile {
        self.state.borrow().clone()
    }

    pub fn cache_handle(&self) -> Arc<dyn CacheInvalidate> {
        Arc::clone(&self.cache) as Arc<dyn CacheInvalidate>
    }

    pub fn cache_age_display(&self) -> String {
        self.cache.age_display()
    }

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

    async fn run_refresh(
        registry: Arc<TaskRegistry>,
        api: HealthApiClient,
        cache: Arc<CacheStore<UserProfile>>,
        state: Arc<watch::Sender<UserProfile>>,
        events: SyncEvents,
    ) -> bool {
        let op_cache = Arc::clone(&cache);
        let outcome = registry
            .run(REFRESH_KEY, async move {
                let profile = api.fetch_profile().await?;
                if let Err(e) = op_cache.force_refresh(&profile) {
                    warn!(error = %e, "Write-through failed after profile refresh");
                }
                Ok(profile)
            })
            .await;

        match outcome {
            Ok(profile) => {
                state.send_replace((*profile).clone());
                events.data_changed(DOMAIN);
                true
            }
            Err(TaskError::Cancelled) => {
                debug!("Profile refresh cancelled");
                false
            }
            Err(TaskError::Failed(e)) => {
                warn!(error = %e, "Profile refresh failed");
                false
            }
        }
    }
}

#[async_trait]
impl DataManager for ProfileManager {
    type Payload = UserProfile;

    async fn initialize(&self) -> Result<()> {
        let cache = Arc::clone(&self.cache);
        let state = Arc::clone(&self.state);
        let outcome = self
            .registry
            .run(INIT_KEY, async move {
                if let Some(cached) = cache.load() {
                    state.send_replace(cached);
                }
                Ok(())
            })
            .await;
        if let Err(TaskError::Failed(e)) = outcome {
            warn!(error = %e, "Profile initialize failed");
        }
        self.spawn_background_refresh();
        Ok(())
    }

    async fn load_data(&self) -> Result<UserProfile> {
        let cache = Arc::clone(&self.cache);
        let api = self.api.clone();
        let outcome = self
            .registry
            .run(LOAD_KEY, async move {
                load_cache_first(
                    &cache,
                    async move { api.fetch_profile().await },
                    // No device-side profile store exists
                    None::<std::future::Ready<Result<UserProfile>>>,
                )
                .await
            })
            .await;

        match outcome {
            Ok(loaded) => {
                debug!(origin = ?loaded.origin, "Profile loaded");
                self.state.send_replace(loaded.payload.clone());
                if loaded.origin == DataOrigin::Remote {
                    self.events.data_changed(DOMAIN);
                }
                Ok(loaded.payload.clone())
            }
            Err(TaskError::Cancelled) => {
                debug!("Profile load cancelled");
                Ok(self.current())
            }
            Err(TaskError::Failed(e)) => Err(anyhow::anyhow!("failed to load profile: {e}")),
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
                state.send_replace(UserProfile::default());
                cache.clear()?;
                events.data_cleared(DOMAIN);
                Ok(())
            })
            .await;
        match outcome {
            Ok(_) | Err(TaskError::Cancelled) => Ok(()),
            Err(TaskError::Failed(e)) => Err(anyhow::anyhow!("failed to clear profile: {e}")),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
