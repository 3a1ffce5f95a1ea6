//! Whole-system analysis snapshot types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::sensor::{HistoryPoint, NormalRange, SensorStatus};

/// System-wide alarm level derived from the mean deviation score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlarmLevel {
    #[default]
    Normal,
    Low,
    Medium,
    High,
}

impl AlarmLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for AlarmLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-sensor row of an analysis snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SensorAnalysis {
    pub key: String,
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub range: NormalRange,
    pub status: SensorStatus,
    pub is_anomaly: bool,
    pub score: f64,
    pub message: String,
    pub history: Vec<HistoryPoint>,
}

/// Analysis over every sensor of one machine. Replaced wholesale per batch.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisSnapshot {
    pub machine_id: Option<String>,
    pub total_score: f64,
    pub alarm_level: AlarmLevel,
    pub sensors: Vec<SensorAnalysis>,
    pub computed_at: DateTime<Utc>,
}

impl Default for AnalysisSnapshot {
    fn default() -> Self {
        Self {
            machine_id: None,
            total_score: 0.0,
            alarm_level: AlarmLevel::Normal,
            sensors: Vec::new(),
            computed_at: Utc::now(),
        }
    }
}

/// Per-sensor row of the trend summary.
#[derive(Debug, Clone, Serialize)]
pub struct SensorTrendRow {
    pub key: String,
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub status: SensorStatus,
    /// `|value - midpoint| / width`, 0 for zero-width ranges
    pub midpoint_deviation: f64,
    /// Mean over the requested window, 0 when the window is empty
    pub window_average: f64,
}

/// Trend summary over a machine's sensors for a time range.
#[derive(Debug, Clone, Serialize)]
pub struct TrendSummary {
    pub machine_id: String,
    pub range: String,
    pub average_deviation: f64,
    pub health_score: f64,
    pub anomaly_count: usize,
    pub sensors: Vec<SensorTrendRow>,
}

/// Health band of the whole line.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FleetHealth {
    Healthy,
    Warning,
    Danger,
}

/// A `danger` sensor as listed in the fleet overview.
#[derive(Debug, Clone, Serialize)]
pub struct CriticalSensor {
    pub machine_id: String,
    pub key: String,
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub score: f64,
}

/// Line-wide overview across every machine.
#[derive(Debug, Clone, Serialize)]
pub struct FleetOverview {
    pub machine_count: usize,
    pub sensor_count: usize,
    /// `1 - mean(range deviation)` over every sensor; 1 with no sensors
    pub health_score: f64,
    pub health: FleetHealth,
    /// Sum of the latest energy-consumption readings
    pub total_energy_consumption: f64,
    pub critical_sensors: Vec<CriticalSensor>,
    pub active_alert_count: usize,
    pub computed_at: DateTime<Utc>,
}
