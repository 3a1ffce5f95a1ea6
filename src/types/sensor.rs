//! Sensor types: the static sensor table, per-sensor status and state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::processing::history::SensorHistory;

// ============================================================================
// Static Sensor Table
// ============================================================================

/// Known sensor types.
///
/// Wire keys are the hub's payload keys (`sicaklik`, `basinc`, ...). The
/// normal ranges and units below are the single source of truth every
/// threshold is derived from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum SensorKind {
    Temperature,
    Pressure,
    Vibration,
    Noise,
    MotorSpeed,
    EnergyConsumption,
}

impl SensorKind {
    pub const ALL: [Self; 6] = [
        Self::Temperature,
        Self::Pressure,
        Self::Vibration,
        Self::Noise,
        Self::MotorSpeed,
        Self::EnergyConsumption,
    ];

    /// Resolve a hub payload key. Unknown keys return `None`.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "sicaklik" => Some(Self::Temperature),
            "basinc" => Some(Self::Pressure),
            "titresim" => Some(Self::Vibration),
            "gurultu" => Some(Self::Noise),
            "motor_hizi" => Some(Self::MotorSpeed),
            "enerji_tuketimi" => Some(Self::EnergyConsumption),
            _ => None,
        }
    }

    /// Hub payload key.
    pub const fn key(self) -> &'static str {
        match self {
            Self::Temperature => "sicaklik",
            Self::Pressure => "basinc",
            Self::Vibration => "titresim",
            Self::Noise => "gurultu",
            Self::MotorSpeed => "motor_hizi",
            Self::EnergyConsumption => "enerji_tuketimi",
        }
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Temperature => "Temperature",
            Self::Pressure => "Pressure",
            Self::Vibration => "Vibration",
            Self::Noise => "Noise",
            Self::MotorSpeed => "Motor Speed",
            Self::EnergyConsumption => "Energy Consumption",
        }
    }

    /// Material icon name used by dashboard clients.
    pub const fn icon(self) -> &'static str {
        match self {
            Self::Temperature => "thermostat",
            Self::Pressure => "speed",
            Self::Vibration => "vibration",
            Self::Noise => "volume_up",
            Self::MotorSpeed => "settings",
            Self::EnergyConsumption => "bolt",
        }
    }

    pub const fn normal_range(self) -> NormalRange {
        match self {
            Self::Temperature => NormalRange::new(20.0, 80.0),
            Self::Pressure => NormalRange::new(0.8, 1.2),
            Self::Vibration => NormalRange::new(0.0, 5.0),
            Self::Noise => NormalRange::new(60.0, 100.0),
            Self::MotorSpeed => NormalRange::new(1000.0, 3000.0),
            Self::EnergyConsumption => NormalRange::new(100.0, 500.0),
        }
    }

    pub const fn unit(self) -> &'static str {
        match self {
            Self::Temperature => "C",
            Self::Pressure => "bar",
            Self::Vibration => "mm/s",
            Self::Noise => "dB",
            Self::MotorSpeed => "rpm",
            Self::EnergyConsumption => "kW",
        }
    }
}

/// Icon for clients that have no sensor kind to go on.
pub const FALLBACK_SENSOR_ICON: &str = "sensors";

/// Display name for a payload key, falling back to the raw key.
pub fn display_name_for(key: &str) -> String {
    SensorKind::from_key(key).map_or_else(|| key.to_string(), |k| k.display_name().to_string())
}

/// Normal range for a payload key; `{0, 0}` for unknown keys.
pub fn normal_range_for(key: &str) -> NormalRange {
    SensorKind::from_key(key).map_or(NormalRange::ZERO, SensorKind::normal_range)
}

pub fn icon_for(key: &str) -> &'static str {
    SensorKind::from_key(key).map_or(FALLBACK_SENSOR_ICON, SensorKind::icon)
}

// ============================================================================
// Ranges and Thresholds
// ============================================================================

/// Static normal operating range in the sensor's natural unit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct NormalRange {
    pub min: f64,
    pub max: f64,
}

impl NormalRange {
    pub const ZERO: Self = Self::new(0.0, 0.0);

    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn width(&self) -> f64 {
        self.max - self.min
    }

    pub fn midpoint(&self) -> f64 {
        (self.max + self.min) / 2.0
    }
}

/// Warning/danger pair the deviation score is computed against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Thresholds {
    pub warning: f64,
    pub danger: f64,
}

impl Thresholds {
    pub const ZERO: Self = Self {
        warning: 0.0,
        danger: 0.0,
    };

    /// Place both thresholds above the range maximum, offset by a fraction
    /// of the range width.
    pub fn above_range(range: NormalRange, warning_margin: f64, danger_margin: f64) -> Self {
        let width = range.width();
        Self {
            warning: range.max + width * warning_margin,
            danger: range.max + width * danger_margin,
        }
    }
}

// ============================================================================
// Status and Trend
// ============================================================================

/// Qualitative per-sensor status. Ordered by severity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(rename_all = "lowercase")]
pub enum SensorStatus {
    #[default]
    Normal,
    Warning,
    Danger,
}

impl std::fmt::Display for SensorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorStatus::Normal => write!(f, "normal"),
            SensorStatus::Warning => write!(f, "warning"),
            SensorStatus::Danger => write!(f, "danger"),
        }
    }
}

/// Direction of the latest change for a sensor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    #[default]
    Stable,
}

// ============================================================================
// Readings and Sensor State
// ============================================================================

/// A single reading extracted from a sensor-data event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub sensor_key: String,
    pub value: f64,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
}

/// One entry of a sensor's rolling history.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct HistoryPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Live state of one sensor on one machine, mutated in place per reading.
#[derive(Debug, Clone, Serialize)]
pub struct SensorState {
    pub key: String,
    pub display_name: String,
    pub icon: &'static str,
    pub value: f64,
    pub unit: String,
    pub status: SensorStatus,
    pub trend: Trend,
    /// Deviation score in [0, 1] for the current value
    pub score: f64,
    pub normal_range: NormalRange,
    pub thresholds: Thresholds,
    pub history: SensorHistory,
    pub last_update: DateTime<Utc>,
}
