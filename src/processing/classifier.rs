//! Sensor Classifier
//!
//! Maps a raw reading onto a deviation score in [0, 1] between the sensor's
//! warning and danger thresholds, and onto a qualitative status.

use crate::config::defaults::{SENSOR_DANGER_SCORE, SENSOR_WARNING_SCORE};
use crate::config::ThresholdConfig;
use crate::types::{normal_range_for, SensorKind, SensorStatus, Thresholds};

/// Result of classifying one reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub score: f64,
    pub status: SensorStatus,
}

/// Deviation score of `value` between `warning` and `danger`.
///
/// Values at or below the warning threshold score 0, at or above danger
/// score 1. A zero-width or inverted band, or a NaN anywhere, scores 0.
pub fn deviation_score(value: f64, thresholds: Thresholds) -> f64 {
    let band = thresholds.danger - thresholds.warning;
    if band.is_nan() || band <= 0.0 || value.is_nan() {
        return 0.0;
    }
    ((value - thresholds.warning) / band).clamp(0.0, 1.0)
}

/// Status for a deviation score. Danger at 0.7, warning at 0.3.
pub fn status_for_score(score: f64) -> SensorStatus {
    if score >= SENSOR_DANGER_SCORE {
        SensorStatus::Danger
    } else if score >= SENSOR_WARNING_SCORE {
        SensorStatus::Warning
    } else {
        SensorStatus::Normal
    }
}

pub fn classify(value: f64, thresholds: Thresholds) -> Classification {
    let score = deviation_score(value, thresholds);
    Classification {
        score,
        status: status_for_score(score),
    }
}

/// Thresholds for a hub payload key. Unknown keys get `{0, 0}`.
pub fn thresholds_for(key: &str, config: &ThresholdConfig) -> Thresholds {
    if SensorKind::from_key(key).is_none() {
        return Thresholds::ZERO;
    }
    Thresholds::above_range(normal_range_for(key), config.warning_margin, config.danger_margin)
}
