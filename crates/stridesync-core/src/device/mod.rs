//! On-device data source used as a fallback when the remote service is
//! unreachable and no fresh cache exists.
//!
//! The platform sensor layer itself (HealthKit, Health Connect, ...) lives
//! in the mobile shell; this module only defines the seam the sync engine
//! consumes, plus a file-backed implementation reading the shell's JSON
//! export directory.

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::models::{Activity, DateRange};

/// File name the shell writes device-recorded activities into.
const DEVICE_EXPORT_FILE: &str = "device_activities.json";

/// Source of activity records captured on the device itself.
#[async_trait]
pub trait DeviceDataSource: Send + Sync {
    /// Whether the device store can currently serve reads.
    fn is_available(&self) -> bool;

    /// Fetch locally recorded activities within the range.
    async fn fetch_local(&self, range: &DateRange) -> Result<Vec<Activity>>;
}

/// Reads activities the mobile shell exported from the platform health store.
///
/// A missing or corrupt export is an empty result, not an error - the
/// device store is a best-effort fallback.
pub struct DeviceHealthStore {
    export_dir: PathBuf,
}

impl DeviceHealthStore {
    pub fn new(export_dir: PathBuf) -> Self {
        Self { export_dir }
    }

    fn export_path(&self) -> PathBuf {
        self.export_dir.join(DEVICE_EXPORT_FILE)
    }

    fn read_all(&self) -> Vec<Activity> {
        let path = self.export_path();
        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                debug!(?path, error = %e, "No device export available");
                return Vec::new();
            }
        };
        match serde_json::from_str(&contents) {
            Ok(activities) => activities,
            Err(e) => {
                debug!(?path, error = %e, "Failed to parse device export");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl DeviceDataSource for DeviceHealthStore {
    fn is_available(&self) -> bool {
        self.export_path().exists()
    }

    async fn fetch_local(&self, range: &DateRange) -> Result<Vec<Activity>> {
        let activities: Vec<Activity> = self
            .read_all()
            .into_iter()
            .filter(|a| range.contains(a.started_at))
            .collect();
        debug!(count = activities.len(), "Loaded activities from device store");
        Ok(activities)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Sport;
    use chrono::{Duration, Utc};

    fn activity(days_ago: i64) -> Activity {
        Activity {
            id: None,
            sport: Sport::Run,
            started_at: Utc::now() - Duration::days(days_ago),
            duration_secs: 1800,
            distance_meters: Some(6000.0),
            avg_heart_rate: None,
            max_heart_rate: None,
            source: Some("device".to_string()),
        }
    }

    #[tokio::test]
    async fn test_missing_export_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = DeviceHealthStore::new(dir.path().to_path_buf());
        assert!(!store.is_available());

        let result = store.fetch_local(&DateRange::last_days(7)).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_local_filters_by_range() {
        let dir = tempfile::tempdir().unwrap();
        let exported = vec![activity(1), activity(3), activity(30)];
        std::fs::write(
            dir.path().join(DEVICE_EXPORT_FILE),
            serde_json::to_string(&exported).unwrap(),
        )
        .unwrap();

        let store = DeviceHealthStore::new(dir.path().to_path_buf());
        assert!(store.is_available());

        let result = store.fetch_local(&DateRange::last_days(7)).await.unwrap();
        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_export_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DEVICE_EXPORT_FILE), "not json").unwrap();

        let store = DeviceHealthStore::new(dir.path().to_path_buf());
        let result = store.fetch_local(&DateRange::last_days(7)).await.unwrap();
        assert!(result.is_empty());
    }
}
