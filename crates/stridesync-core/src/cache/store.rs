//! Generic TTL-based persisted cache, one instance per data domain.

use std::marker::PhantomData;
use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use super::event_bus::CacheInvalidate;

/// Persisted TTL cache for one data domain.
///
/// Each store owns two records under its cache directory:
/// `<id>_data.json` holds the serialized payload and `<id>_time.json`
/// holds the timestamp of the last successful write. Dropping only the
/// time record leaves the payload usable as a stale fallback while
/// forcing the next load to refresh.
///
/// Expiry is evaluated lazily on read; there is no background sweep.
pub struct CacheStore<T> {
    dir: PathBuf,
    id: String,
    ttl: Duration,
    _marker: PhantomData<fn() -> T>,
}

impl<T> CacheStore<T> {
    pub fn new(dir: PathBuf, id: impl Into<String>, ttl: Duration) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            id: id.into(),
            ttl,
            _marker: PhantomData,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn data_path(&self) -> PathBuf {
        self.dir.join(format!("{}_data.json", self.id))
    }

    fn time_path(&self) -> PathBuf {
        self.dir.join(format!("{}_time.json", self.id))
    }

    /// Timestamp of the last successful write, if any.
    pub fn stored_at(&self) -> Option<DateTime<Utc>> {
        let contents = std::fs::read_to_string(self.time_path()).ok()?;
        match serde_json::from_str(&contents) {
            Ok(ts) => Some(ts),
            Err(e) => {
                debug!(cache = %self.id, error = %e, "Corrupt cache timestamp, treating as absent");
                None
            }
        }
    }

    /// True when the stored entry has outlived its TTL.
    /// An absent entry is not "expired" - see [`should_refresh`](Self::should_refresh).
    pub fn is_expired(&self) -> bool {
        match self.stored_at() {
            Some(stored_at) => Utc::now() - stored_at >= self.ttl,
            None => false,
        }
    }

    /// True when the entry is absent or expired, i.e. a load should go remote.
    pub fn should_refresh(&self) -> bool {
        match self.stored_at() {
            Some(stored_at) => Utc::now() - stored_at >= self.ttl,
            None => true,
        }
    }

    /// Total bytes persisted for this cache.
    pub fn size_bytes(&self) -> u64 {
        [self.data_path(), self.time_path()]
            .iter()
            .filter_map(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .sum()
    }

    /// Age of the cached entry, if any.
    pub fn age(&self) -> Option<Duration> {
        self.stored_at().map(|stored_at| Utc::now() - stored_at)
    }

    /// Human-readable age for status surfaces ("just now", "5m ago", ...).
    pub fn age_display(&self) -> String {
        let minutes = match self.age() {
            Some(age) => age.num_minutes(),
            None => return "never".to_string(),
        };
        if minutes < 1 {
            // Also covers clock skew (negative ages)
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            let remaining_mins = minutes % 60;
            if remaining_mins >= 30 {
                // Round up: 1h 30m+ becomes 2h
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            let remaining_hours = (minutes % 1440) / 60;
            if remaining_hours >= 12 {
                // Round up: 1d 12h+ becomes 2d
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }

    /// Remove both the payload and its timestamp.
    pub fn clear(&self) -> Result<()> {
        for path in [self.data_path(), self.time_path()] {
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    /// Drop only the timestamp so [`should_refresh`](Self::should_refresh)
    /// turns true while the payload survives as a stale fallback.
    pub fn mark_stale(&self) -> Result<()> {
        let path = self.time_path();
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

impl<T: Serialize + DeserializeOwned> CacheStore<T> {
    /// Pure local read. A missing or corrupt record is a miss, never an error.
    pub fn load(&self) -> Option<T> {
        let path = self.data_path();
        let contents = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(payload) => Some(payload),
            Err(e) => {
                debug!(cache = %self.id, error = %e, "Corrupt cache record, treating as miss");
                None
            }
        }
    }

    /// Write-through: persist the payload, then stamp the write time.
    pub fn save(&self, payload: &T) -> Result<()> {
        let contents = serde_json::to_string_pretty(payload)?;
        std::fs::write(self.data_path(), contents)?;
        let stamp = serde_json::to_string(&Utc::now())?;
        std::fs::write(self.time_path(), stamp)?;
        Ok(())
    }

    /// Overwrite regardless of TTL state, used after a successful forced sync.
    pub fn force_refresh(&self, payload: &T) -> Result<()> {
        debug!(cache = %self.id, "Forced cache overwrite");
        self.save(payload)
    }
}

impl<T> CacheInvalidate for CacheStore<T> {
    fn cache_id(&self) -> &str {
        &self.id
    }

    fn clear_cache(&self) -> Result<()> {
        self.clear()
    }

    fn mark_cache_stale(&self) -> Result<()> {
        self.mark_stale()
    }
}

// ============================================================================
// Tests
// ============================================================================
