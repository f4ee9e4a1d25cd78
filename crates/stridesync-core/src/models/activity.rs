//! Domain models for recorded activities.
//!
//! These types represent workout data in a clean domain format,
//! decoupled from the API response structures and from whatever the
//! device health store exports.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Sport discipline for an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sport {
    Run,
    Ride,
    Swim,
    Walk,
    Other,
}

impl Default for Sport {
    fn default() -> Self {
        Sport::Other
    }
}

impl Sport {
    /// Get the display name for this sport.
    pub fn display_name(&self) -> &'static str {
        match self {
            Sport::Run => "Run",
            Sport::Ride => "Ride",
            Sport::Swim => "Swim",
            Sport::Walk => "Walk",
            Sport::Other => "Other",
        }
    }
}

/// A single recorded workout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: Option<i64>,
    pub sport: Sport,
    #[serde(rename = "startedAt")]
    pub started_at: DateTime<Utc>,
    #[serde(rename = "durationSecs")]
    pub duration_secs: u32,
    #[serde(rename = "distanceMeters")]
    pub distance_meters: Option<f64>,
    #[serde(rename = "avgHeartRate")]
    pub avg_heart_rate: Option<u16>,
    #[serde(rename = "maxHeartRate")]
    pub max_heart_rate: Option<u16>,
    /// Where the record came from ("device", "manual", ...).
    pub source: Option<String>,
}

impl Activity {
    /// Average pace in seconds per kilometer, if distance is known.
    pub fn pace_secs_per_km(&self) -> Option<f64> {
        let meters = self.distance_meters?;
        if meters <= 0.0 {
            return None;
        }
        Some(self.duration_secs as f64 / (meters / 1000.0))
    }

    /// Format duration as h:mm:ss or m:ss for short efforts.
    pub fn duration_display(&self) -> String {
        let total = self.duration_secs;
        let hours = total / 3600;
        let minutes = (total % 3600) / 60;
        let seconds = total % 60;
        if hours > 0 {
            format!("{}:{:02}:{:02}", hours, minutes, seconds)
        } else {
            format!("{}:{:02}", minutes, seconds)
        }
    }
}

/// Aggregated totals over a set of activities.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub count: usize,
    #[serde(rename = "totalDurationSecs")]
    pub total_duration_secs: u64,
    #[serde(rename = "totalDistanceMeters")]
    pub total_distance_meters: f64,
}

impl ActivitySummary {
    pub fn from_activities(activities: &[Activity]) -> Self {
        Self {
            count: activities.len(),
            total_duration_secs: activities.iter().map(|a| a.duration_secs as u64).sum(),
            total_distance_meters: activities
                .iter()
                .filter_map(|a| a.distance_meters)
                .sum(),
        }
    }
}

/// Inclusive time window for activity queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Range covering the last `days` days up to now.
    pub fn last_days(days: i64) -> Self {
        let end = Utc::now();
        Self {
            start: end - Duration::days(days),
            end,
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant <= self.end
    }
}

// ============================================================================
// Tests
// ============================================================================
