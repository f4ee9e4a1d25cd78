//! Domain model for the athlete profile.

use serde::{Deserialize, Serialize};

/// Athlete settings and training targets.
///
/// Changes rarely compared to activity data, so it lives in its own
/// cache with a longer TTL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(rename = "athleteId")]
    pub athlete_id: Option<i64>,
    #[serde(rename = "displayName")]
    pub display_name: Option<String>,
    #[serde(rename = "maxHeartRate")]
    pub max_heart_rate: Option<u16>,
    #[serde(rename = "restingHeartRate")]
    pub resting_heart_rate: Option<u16>,
    /// Threshold pace in seconds per kilometer.
    #[serde(rename = "thresholdPaceSecsPerKm")]
    pub threshold_pace_secs_per_km: Option<f64>,
    /// Weekly volume target in minutes.
    #[serde(rename = "weeklyTargetMins")]
    pub weekly_target_mins: Option<u32>,
}

impl UserProfile {
    /// Heart rate reserve (max minus resting), when both are known.
    pub fn heart_rate_reserve(&self) -> Option<u16> {
        match (self.max_heart_rate, self.resting_heart_rate) {
            (Some(max), Some(rest)) if max > rest => Some(max - rest),
            _ => None,
        }
    }
}
