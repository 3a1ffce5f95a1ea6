//! Analysis Aggregator
//!
//! Whole-system view over a machine's sensors: mean deviation score, alarm
//! level, per-sensor messages and the trend summary.
//!
//! Alarm breakpoints (0.3 / 0.5 / 0.7) deliberately differ from the sensor
//! status breakpoints (0.3 / 0.7).

use chrono::{DateTime, Utc};

use crate::config::defaults::{
    ALARM_HIGH_SCORE, ALARM_LOW_SCORE, ALARM_MEDIUM_SCORE, FLEET_HEALTHY_SCORE, FLEET_WARNING_SCORE,
};
use crate::processing::history::TimeRange;
use crate::types::{
    AlarmLevel, AnalysisSnapshot, CriticalSensor, FleetHealth, FleetOverview, MachineState,
    SensorAnalysis, SensorKind, SensorState, SensorStatus, SensorTrendRow, TrendSummary,
};

/// Mean of the scores; 0 for an empty set.
pub fn total_score(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = scores.len() as f64;
    scores.iter().sum::<f64>() / n
}

pub fn alarm_level(total: f64) -> AlarmLevel {
    if total >= ALARM_HIGH_SCORE {
        AlarmLevel::High
    } else if total >= ALARM_MEDIUM_SCORE {
        AlarmLevel::Medium
    } else if total >= ALARM_LOW_SCORE {
        AlarmLevel::Low
    } else {
        AlarmLevel::Normal
    }
}

/// Operator message for a sensor score, with the reading appended.
/// Empty below the deviation band.
pub fn anomaly_message(name: &str, score: f64, value: f64, unit: &str) -> String {
    let reading = if unit.is_empty() {
        format!("({value})")
    } else {
        format!("({value} {unit})")
    };
    if score >= 0.7 {
        format!("{name} at critical level {reading}")
    } else if score >= 0.5 {
        format!("{name} outside normal range {reading}")
    } else if score >= 0.3 {
        format!("{name} deviation detected {reading}")
    } else {
        String::new()
    }
}

fn sensor_row(sensor: &SensorState) -> SensorAnalysis {
    SensorAnalysis {
        key: sensor.key.clone(),
        name: sensor.display_name.clone(),
        value: sensor.value,
        unit: sensor.unit.clone(),
        range: sensor.normal_range,
        status: sensor.status,
        is_anomaly: sensor.status != SensorStatus::Normal,
        score: sensor.score,
        message: anomaly_message(&sensor.display_name, sensor.score, sensor.value, &sensor.unit),
        history: sensor.history.to_vec(),
    }
}

/// Snapshot over every sensor currently held for `machine`.
pub fn build_snapshot(machine: &MachineState, now: DateTime<Utc>) -> AnalysisSnapshot {
    let sensors: Vec<SensorAnalysis> = machine.sensors.values().map(sensor_row).collect();
    let scores: Vec<f64> = sensors.iter().map(|s| s.score).collect();
    let total = total_score(&scores);

    AnalysisSnapshot {
        machine_id: Some(machine.id.clone()),
        total_score: total,
        alarm_level: alarm_level(total),
        sensors,
        computed_at: now,
    }
}

// ============================================================================
// Trend Summary
// ============================================================================

/// `|value - midpoint| / width`; 0 for zero-width or inverted ranges.
pub fn midpoint_deviation(sensor: &SensorState) -> f64 {
    let width = sensor.normal_range.width();
    if width <= 0.0 || width.is_nan() || sensor.value.is_nan() {
        return 0.0;
    }
    (sensor.value - sensor.normal_range.midpoint()).abs() / width
}

pub fn trend_summary(machine: &MachineState, now: DateTime<Utc>, range: TimeRange) -> TrendSummary {
    let rows: Vec<SensorTrendRow> = machine
        .sensors
        .values()
        .map(|s| SensorTrendRow {
            key: s.key.clone(),
            name: s.display_name.clone(),
            value: s.value,
            unit: s.unit.clone(),
            status: s.status,
            midpoint_deviation: midpoint_deviation(s),
            window_average: s.history.average(now, range),
        })
        .collect();

    let deviations: Vec<f64> = rows.iter().map(|r| r.midpoint_deviation).collect();
    let average_deviation = total_score(&deviations);
    let anomaly_count = rows.iter().filter(|r| r.status != SensorStatus::Normal).count();

    TrendSummary {
        machine_id: machine.id.clone(),
        range: range.as_str().to_string(),
        average_deviation,
        health_score: 1.0 - average_deviation,
        anomaly_count,
        sensors: rows,
    }
}

// ============================================================================
// Fleet Overview
// ============================================================================

/// Distance outside the normal range as a fraction of its width, capped at 1.
/// Readings inside the range, zero-width ranges and NaN score 0.
pub fn range_deviation(sensor: &SensorState) -> f64 {
    let range = sensor.normal_range;
    let width = range.width();
    if width <= 0.0 || width.is_nan() || sensor.value.is_nan() {
        return 0.0;
    }
    let outside = (sensor.value - range.max).max(range.min - sensor.value).max(0.0);
    (outside / width).min(1.0)
}

pub fn fleet_health(score: f64) -> FleetHealth {
    if score >= FLEET_HEALTHY_SCORE {
        FleetHealth::Healthy
    } else if score >= FLEET_WARNING_SCORE {
        FleetHealth::Warning
    } else {
        FleetHealth::Danger
    }
}

pub fn fleet_overview<'a>(
    machines: impl IntoIterator<Item = &'a MachineState>,
    now: DateTime<Utc>,
) -> FleetOverview {
    let mut machine_count = 0;
    let mut deviations = Vec::new();
    let mut total_energy_consumption = 0.0;
    let mut critical_sensors = Vec::new();
    let mut active_alert_count = 0;

    for machine in machines {
        machine_count += 1;
        active_alert_count += machine.alerts.iter().filter(|a| !a.acknowledged).count();
        for sensor in machine.sensors.values() {
            deviations.push(range_deviation(sensor));
            if SensorKind::from_key(&sensor.key) == Some(SensorKind::EnergyConsumption) {
                total_energy_consumption += sensor.value;
            }
            if sensor.status == SensorStatus::Danger {
                critical_sensors.push(CriticalSensor {
                    machine_id: machine.id.clone(),
                    key: sensor.key.clone(),
                    name: sensor.display_name.clone(),
                    value: sensor.value,
                    unit: sensor.unit.clone(),
                    score: sensor.score,
                });
            }
        }
    }

    // total_score is 0 for no sensors, so an empty line scores 1
    let health_score = 1.0 - total_score(&deviations);
    FleetOverview {
        machine_count,
        sensor_count: deviations.len(),
        health_score,
        health: fleet_health(health_score),
        total_energy_consumption,
        critical_sensors,
        active_alert_count,
        computed_at: now,
    }
}
