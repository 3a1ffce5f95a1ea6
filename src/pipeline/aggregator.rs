//! Dashboard Aggregator - owns every machine and applies hub events
//!
//! One instance per process. Each update method runs the reducers in order
//! (classifier, trend, history, machine status, analysis) and returns what
//! changed so the caller can publish it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::DashboardError;
use crate::config::{MachineConfig, MonitorConfig, ThresholdConfig};
use crate::processing::analysis::{anomaly_message, build_snapshot, fleet_overview, trend_summary};
use crate::processing::{
    classify, machine_status, thresholds_for, trend, HistoryStats, SensorHistory, TimeRange,
};
use crate::types::{
    display_name_for, icon_for, normal_range_for, Alert, AlertCategory, AlertFilter, AlertSeverity,
    AnalysisSnapshot, AnomalyAlertEvent, FleetOverview, HistoryPoint, MachineState, MachineStatus,
    MachineSummary, SensorDataEvent, SensorState, SensorStatus, TrendSummary,
};

/// Aggregator knobs taken from the monitor config.
#[derive(Debug, Clone)]
pub struct AggregatorSettings {
    pub thresholds: ThresholdConfig,
    pub history_capacity: usize,
    /// Cap on alerts returned by a view. Stored alerts are never deleted, so
    /// each machine's alert list grows with every escalation for the life of
    /// the process.
    pub max_alerts: usize,
    pub machines: MachineConfig,
}

impl From<&MonitorConfig> for AggregatorSettings {
    fn from(c: &MonitorConfig) -> Self {
        Self {
            thresholds: c.thresholds,
            history_capacity: c.history.capacity,
            max_alerts: c.alerts.max_alerts,
            machines: c.machines.clone(),
        }
    }
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self::from(&MonitorConfig::default())
    }
}

/// Result of applying one sensor-data event.
#[derive(Debug, Clone)]
pub struct SensorDataOutcome {
    pub machine: MachineState,
    pub analysis: AnalysisSnapshot,
    pub new_alerts: Vec<Alert>,
}

/// Result of applying one anomaly-alert event.
#[derive(Debug, Clone)]
pub struct AnomalyOutcome {
    pub alert: Option<Alert>,
    pub machine: Option<MachineState>,
    /// Severity the notification should carry
    pub severity: AlertSeverity,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregatorStats {
    pub sensor_events: u64,
    pub anomaly_events: u64,
    pub readings: u64,
    pub alerts_raised: u64,
}

/// Sensor history window plus statistics.
#[derive(Debug, Clone, Serialize)]
pub struct SensorHistoryView {
    pub machine_id: String,
    pub sensor: String,
    pub name: String,
    pub unit: String,
    pub range: String,
    pub points: Vec<HistoryPoint>,
    pub stats: HistoryStats,
}

pub struct DashboardAggregator {
    settings: AggregatorSettings,
    machines: BTreeMap<String, MachineState>,
    active_machine: Option<String>,
    latest_anomaly: Option<AnomalyAlertEvent>,
    alert_seq: u64,
    stats: AggregatorStats,
}

impl DashboardAggregator {
    pub fn new(settings: AggregatorSettings) -> Self {
        Self {
            settings,
            machines: BTreeMap::new(),
            active_machine: None,
            latest_anomaly: None,
            alert_seq: 0,
            stats: AggregatorStats::default(),
        }
    }

    fn next_alert_id(&mut self) -> String {
        self.alert_seq += 1;
        format!("ALT-{:06}", self.alert_seq)
    }

    fn ensure_machine(&mut self, id: &str, now: DateTime<Utc>) -> &mut MachineState {
        let name = self.settings.machines.display_name(id);
        self.machines.entry(id.to_string()).or_insert_with(|| {
            info!(machine_id = %id, name = %name, "New machine registered");
            MachineState::new(id, name, now)
        })
    }

    // ========================================================================
    // Event Application
    // ========================================================================

    /// Merge a sensor-data event into its machine.
    ///
    /// Sensors absent from the payload keep their last state. An unparseable
    /// event timestamp falls back to `received_at`.
    pub fn apply_sensor_data(&mut self, event: &SensorDataEvent, received_at: DateTime<Utc>) -> SensorDataOutcome {
        let ts = event.parsed_timestamp().unwrap_or_else(|| {
            debug!(machine_id = %event.machine_id, raw = %event.timestamp, "Using receipt time for event");
            received_at
        });

        self.stats.sensor_events += 1;
        let thresholds_cfg = self.settings.thresholds;
        let capacity = self.settings.history_capacity;

        // Escalations collected first; alert ids need &mut self
        let mut escalations: Vec<(AlertSeverity, String)> = Vec::new();

        let readings = event.readings(ts);
        let machine = self.ensure_machine(&event.machine_id, ts);
        for reading in readings {
            let key = &reading.sensor_key;
            let thresholds = thresholds_for(key, &thresholds_cfg);
            let c = classify(reading.value, thresholds);

            if c.status > machine.sensors.get(key).map_or(SensorStatus::Normal, |s| s.status) {
                escalations.push((
                    AlertSeverity::from_score(c.score),
                    anomaly_message(&display_name_for(key), c.score, reading.value, &reading.unit),
                ));
            }

            match machine.sensors.get_mut(key) {
                Some(state) => {
                    state.trend = trend::detect(reading.value, Some(state.value));
                    state.value = reading.value;
                    state.unit = reading.unit;
                    state.status = c.status;
                    state.score = c.score;
                    state.thresholds = thresholds;
                    state.history.push(reading.timestamp, reading.value);
                    state.last_update = reading.timestamp;
                }
                None => {
                    let mut history = SensorHistory::new(capacity);
                    history.push(reading.timestamp, reading.value);
                    let state = SensorState {
                        key: key.clone(),
                        display_name: display_name_for(key),
                        icon: icon_for(key),
                        value: reading.value,
                        unit: reading.unit,
                        status: c.status,
                        trend: trend::detect(reading.value, None),
                        score: c.score,
                        normal_range: normal_range_for(key),
                        thresholds,
                        history,
                        last_update: reading.timestamp,
                    };
                    machine.sensors.insert(reading.sensor_key, state);
                }
            }
        }

        machine.status = machine_status::resolve(
            machine.sensors.values().map(|s| s.status),
            machine.maintenance,
        );
        machine.last_update = ts;
        self.stats.readings += event.sensors.len() as u64;

        let mut new_alerts = Vec::with_capacity(escalations.len());
        for (severity, message) in escalations {
            let alert = Alert {
                id: self.next_alert_id(),
                machine_id: event.machine_id.clone(),
                severity,
                message,
                timestamp: ts,
                acknowledged: false,
                category: AlertCategory::Performance,
            };
            new_alerts.push(alert);
        }
        self.stats.alerts_raised += new_alerts.len() as u64;

        let machine = self.ensure_machine(&event.machine_id, ts);
        machine.alerts.extend(new_alerts.iter().cloned());
        let machine = machine.clone();
        let analysis = build_snapshot(&machine, received_at);
        self.active_machine = Some(event.machine_id.clone());

        SensorDataOutcome {
            machine,
            analysis,
            new_alerts,
        }
    }

    /// Record an upstream anomaly alert. Score and level are not recomputed.
    pub fn apply_anomaly_alert(&mut self, event: &AnomalyAlertEvent, received_at: DateTime<Utc>) -> AnomalyOutcome {
        self.stats.anomaly_events += 1;
        self.latest_anomaly = Some(event.clone());

        let severity = event
            .alarm_level
            .parse::<AlertSeverity>()
            .unwrap_or_else(|_| AlertSeverity::from_score(event.score));

        if !event.is_anomaly {
            return AnomalyOutcome {
                alert: None,
                machine: None,
                severity,
            };
        }

        let ts = event.parsed_timestamp().unwrap_or(received_at);
        let message = if event.messages.is_empty() {
            format!("Anomaly detected (score {:.2})", event.score)
        } else {
            event.messages.join("; ")
        };
        let alert = Alert {
            id: self.next_alert_id(),
            machine_id: event.machine_id.clone(),
            severity: AlertSeverity::from_score(event.score),
            message,
            timestamp: ts,
            acknowledged: false,
            category: AlertCategory::Anomaly,
        };
        self.stats.alerts_raised += 1;

        let machine = self.ensure_machine(&event.machine_id, ts);
        machine.alerts.push(alert.clone());

        AnomalyOutcome {
            alert: Some(alert),
            machine: Some(machine.clone()),
            severity,
        }
    }

    // ========================================================================
    // Operator Actions
    // ========================================================================

    /// Flip the maintenance override. Turning it off recomputes the status
    /// from the current sensors.
    pub fn toggle_maintenance(&mut self, machine_id: &str) -> Result<MachineState, DashboardError> {
        let machine = self
            .machines
            .get_mut(machine_id)
            .ok_or_else(|| DashboardError::UnknownMachine(machine_id.to_string()))?;

        machine.maintenance = !machine.maintenance;
        machine.status = machine_status::resolve(
            machine.sensors.values().map(|s| s.status),
            machine.maintenance,
        );
        info!(machine_id, status = %machine.status, "Maintenance override toggled");
        Ok(machine.clone())
    }

    pub fn find_alert(&self, alert_id: &str) -> Option<&Alert> {
        self.machines
            .values()
            .flat_map(|m| m.alerts.iter())
            .find(|a| a.id == alert_id)
    }

    /// Mark an alert acknowledged. Returns the alert and its machine.
    pub fn acknowledge_alert(&mut self, alert_id: &str) -> Result<(Alert, MachineState), DashboardError> {
        for machine in self.machines.values_mut() {
            if let Some(alert) = machine.alerts.iter_mut().find(|a| a.id == alert_id) {
                alert.acknowledged = true;
                let alert = alert.clone();
                return Ok((alert, machine.clone()));
            }
        }
        Err(DashboardError::UnknownAlert(alert_id.to_string()))
    }

    // ========================================================================
    // Views
    // ========================================================================

    /// Unacknowledged alerts matching `filter`, most severe first then
    /// newest first, capped at `max_alerts`.
    pub fn active_alerts(&self, filter: &AlertFilter, now: DateTime<Utc>) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self
            .machines
            .values()
            .flat_map(|m| m.alerts.iter())
            .filter(|a| filter.matches(a, now))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| {
            a.severity
                .rank()
                .cmp(&b.severity.rank())
                .then_with(|| b.timestamp.cmp(&a.timestamp))
        });
        alerts.truncate(self.settings.max_alerts);
        alerts
    }

    pub fn machine(&self, machine_id: &str) -> Option<&MachineState> {
        self.machines.get(machine_id)
    }

    pub fn machines(&self) -> Vec<MachineSummary> {
        self.machines.values().map(MachineSummary::from).collect()
    }

    /// Machine the most recent sensor-data event was for.
    pub fn active_machine(&self) -> Option<&MachineState> {
        self.active_machine.as_deref().and_then(|id| self.machines.get(id))
    }

    pub fn latest_anomaly(&self) -> Option<&AnomalyAlertEvent> {
        self.latest_anomaly.as_ref()
    }

    pub fn analysis_for(&self, machine_id: &str, now: DateTime<Utc>) -> Result<AnalysisSnapshot, DashboardError> {
        self.machines
            .get(machine_id)
            .map(|m| build_snapshot(m, now))
            .ok_or_else(|| DashboardError::UnknownMachine(machine_id.to_string()))
    }

    pub fn sensor_history(
        &self,
        machine_id: &str,
        sensor_key: &str,
        now: DateTime<Utc>,
        range: TimeRange,
    ) -> Result<SensorHistoryView, DashboardError> {
        let machine = self
            .machines
            .get(machine_id)
            .ok_or_else(|| DashboardError::UnknownMachine(machine_id.to_string()))?;
        let sensor = machine.sensors.get(sensor_key).ok_or_else(|| DashboardError::UnknownSensor {
            machine_id: machine_id.to_string(),
            sensor: sensor_key.to_string(),
        })?;

        Ok(SensorHistoryView {
            machine_id: machine_id.to_string(),
            sensor: sensor_key.to_string(),
            name: sensor.display_name.clone(),
            unit: sensor.unit.clone(),
            range: range.as_str().to_string(),
            points: sensor.history.window(now, range),
            stats: sensor.history.stats(now, range),
        })
    }

    pub fn trends(&self, machine_id: &str, now: DateTime<Utc>, range: TimeRange) -> Result<TrendSummary, DashboardError> {
        self.machines
            .get(machine_id)
            .map(|m| trend_summary(m, now, range))
            .ok_or_else(|| DashboardError::UnknownMachine(machine_id.to_string()))
    }

    pub fn machine_status(&self, machine_id: &str) -> Option<MachineStatus> {
        self.machines.get(machine_id).map(|m| m.status)
    }

    pub fn stats(&self) -> &AggregatorStats {
        &self.stats
    }

    /// Line-wide health, energy, critical sensors and alert count.
    pub fn overview(&self, now: DateTime<Utc>) -> FleetOverview {
        fleet_overview(self.machines.values(), now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AlarmLevel, SensorValue, Trend};

    fn event(machine: &str, readings: &[(&str, f64)]) -> SensorDataEvent {
        SensorDataEvent {
            machine_id: machine.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            sensors: readings
                .iter()
                .map(|(k, v)| {
                    (
                        (*k).to_string(),
                        SensorValue {
                            value: *v,
                            unit: String::new(),
                        },
                    )
                })
                .collect(),
        }
    }

    fn aggregator() -> DashboardAggregator {
        DashboardAggregator::new(AggregatorSettings::default())
    }

    #[test]
    fn test_first_reading_creates_machine_and_sensor() {
        let mut agg = aggregator();
        let out = agg.apply_sensor_data(&event("MACHINE-001", &[("sicaklik", 50.0)]), Utc::now());
        assert_eq!(out.machine.name, "Packaging Line");
        let sensor = &out.machine.sensors["sicaklik"];
        assert_eq!(sensor.unit, "C");
        assert_eq!(sensor.trend, Trend::Stable);
        assert_eq!(sensor.status, SensorStatus::Normal);
        assert_eq!(out.machine.status, MachineStatus::Operational);
        assert!(out.new_alerts.is_empty());
    }

    #[test]
    fn test_trend_uses_previous_value_of_same_machine() {
        let mut agg = aggregator();
        agg.apply_sensor_data(&event("M1", &[("basinc", 1.0)]), Utc::now());
        agg.apply_sensor_data(&event("M2", &[("basinc", 5.0)]), Utc::now());
        let out = agg.apply_sensor_data(&event("M1", &[("basinc", 0.9)]), Utc::now());
        assert_eq!(out.machine.sensors["basinc"].trend, Trend::Down);
        assert_eq!(out.machine.sensors["basinc"].history.len(), 2);
    }

    #[test]
    fn test_missing_sensors_are_retained() {
        let mut agg = aggregator();
        agg.apply_sensor_data(&event("M1", &[("sicaklik", 50.0), ("basinc", 1.0)]), Utc::now());
        let out = agg.apply_sensor_data(&event("M1", &[("sicaklik", 55.0)]), Utc::now());
        assert_eq!(out.machine.sensors.len(), 2);
        assert_eq!(out.analysis.sensors.len(), 2);
    }

    #[test]
    fn test_escalation_raises_performance_alert_once() {
        let mut agg = aggregator();
        let out = agg.apply_sensor_data(&event("M1", &[("sicaklik", 95.0)]), Utc::now());
        assert_eq!(out.new_alerts.len(), 1);
        assert_eq!(out.new_alerts[0].category, AlertCategory::Performance);
        assert_eq!(out.new_alerts[0].severity, AlertSeverity::High);

        // Staying in danger does not raise again
        let out = agg.apply_sensor_data(&event("M1", &[("sicaklik", 96.0)]), Utc::now());
        assert!(out.new_alerts.is_empty());
        assert_eq!(out.machine.alerts.len(), 1);
    }

    #[test]
    fn test_unknown_sensor_key_falls_back() {
        let mut agg = aggregator();
        let out = agg.apply_sensor_data(&event("M1", &[("nem", 1e6)]), Utc::now());
        let sensor = &out.machine.sensors["nem"];
        assert_eq!(sensor.display_name, "nem");
        assert_eq!(sensor.score, 0.0);
        assert_eq!(sensor.status, SensorStatus::Normal);
    }

    #[test]
    fn test_bad_timestamp_uses_receipt_time() {
        let mut agg = aggregator();
        let mut ev = event("M1", &[("sicaklik", 40.0)]);
        ev.timestamp = "garbage".to_string();
        let received = Utc::now();
        let out = agg.apply_sensor_data(&ev, received);
        assert_eq!(out.machine.last_update, received);
    }

    #[test]
    fn test_maintenance_is_sticky_until_toggled_off() {
        let mut agg = aggregator();
        agg.apply_sensor_data(&event("M1", &[("sicaklik", 50.0)]), Utc::now());
        let m = agg.toggle_maintenance("M1").unwrap();
        assert_eq!(m.status, MachineStatus::Maintenance);

        let out = agg.apply_sensor_data(&event("M1", &[("sicaklik", 120.0)]), Utc::now());
        assert_eq!(out.machine.status, MachineStatus::Maintenance);

        let m = agg.toggle_maintenance("M1").unwrap();
        assert_eq!(m.status, MachineStatus::Error);
        assert!(matches!(
            agg.toggle_maintenance("nope"),
            Err(DashboardError::UnknownMachine(_))
        ));
    }

    #[test]
    fn test_anomaly_alert_creates_machine_and_alert() {
        let mut agg = aggregator();
        let ev = AnomalyAlertEvent {
            machine_id: "M9".to_string(),
            timestamp: String::new(),
            is_anomaly: true,
            score: 0.55,
            alarm_level: "high".to_string(),
            messages: vec!["Vibration spike".to_string()],
            sensor_data: Default::default(),
        };
        let out = agg.apply_anomaly_alert(&ev, Utc::now());
        let alert = out.alert.unwrap();
        assert_eq!(alert.category, AlertCategory::Anomaly);
        assert_eq!(alert.severity, AlertSeverity::Medium);
        assert_eq!(alert.message, "Vibration spike");
        assert_eq!(out.severity, AlertSeverity::High);
        assert!(agg.machine("M9").is_some());
        assert_eq!(agg.latest_anomaly().map(|a| a.score), Some(0.55));
    }

    #[test]
    fn test_non_anomaly_event_only_recorded() {
        let mut agg = aggregator();
        let ev = AnomalyAlertEvent {
            machine_id: "M1".to_string(),
            timestamp: String::new(),
            is_anomaly: false,
            score: 0.1,
            alarm_level: "normal".to_string(),
            messages: vec![],
            sensor_data: Default::default(),
        };
        let out = agg.apply_anomaly_alert(&ev, Utc::now());
        assert!(out.alert.is_none());
        assert_eq!(out.severity, AlertSeverity::Low);
        assert!(agg.machine("M1").is_none());
        assert!(agg.latest_anomaly().is_some());
    }

    #[test]
    fn test_active_alerts_sorted_and_acknowledged_hidden() {
        let mut agg = aggregator();
        // warning-level escalation on pressure: (1.25 - 1.2) / 0.12 ~ 0.42
        agg.apply_sensor_data(&event("M1", &[("basinc", 1.25)]), Utc::now());
        agg.apply_sensor_data(&event("M1", &[("sicaklik", 99.0)]), Utc::now());

        let alerts = agg.active_alerts(&AlertFilter::default(), Utc::now());
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].severity, AlertSeverity::High);
        assert_eq!(alerts[1].severity, AlertSeverity::Low);

        let id = alerts[0].id.clone();
        let (acked, _) = agg.acknowledge_alert(&id).unwrap();
        assert!(acked.acknowledged);
        assert_eq!(agg.active_alerts(&AlertFilter::default(), Utc::now()).len(), 1);
        assert!(matches!(
            agg.acknowledge_alert("ALT-999999"),
            Err(DashboardError::UnknownAlert(_))
        ));
    }

    #[test]
    fn test_end_to_end_temperature_danger() {
        let mut agg = aggregator();
        let out = agg.apply_sensor_data(&event("M1", &[("sicaklik", 95.0)]), Utc::now());
        assert_eq!(out.machine.sensors["sicaklik"].status, SensorStatus::Danger);
        assert_eq!(out.machine.status, MachineStatus::Error);
        assert!(out.analysis.total_score >= 0.5);
        assert!(out.analysis.alarm_level >= AlarmLevel::Medium);
    }

    #[test]
    fn test_overview_counts_unacknowledged_alerts_across_machines() {
        let mut agg = aggregator();
        let empty = agg.overview(Utc::now());
        assert_eq!(empty.health_score, 1.0);
        assert_eq!(empty.active_alert_count, 0);

        agg.apply_sensor_data(&event("M1", &[("sicaklik", 95.0), ("enerji_tuketimi", 300.0)]), Utc::now());
        let out = agg.apply_sensor_data(&event("M2", &[("gurultu", 115.0), ("enerji_tuketimi", 250.0)]), Utc::now());
        agg.acknowledge_alert(&out.new_alerts[0].id).unwrap();

        let overview = agg.overview(Utc::now());
        assert_eq!(overview.machine_count, 2);
        assert_eq!(overview.sensor_count, 4);
        assert_eq!(overview.active_alert_count, 1);
        assert!((overview.total_energy_consumption - 550.0).abs() < 1e-9);
        assert_eq!(overview.critical_sensors.len(), 2);
        // sicaklik (95-80)/60 = 0.25, gurultu (115-100)/40 = 0.375
        assert!((overview.health_score - (1.0 - 0.625 / 4.0)).abs() < 1e-9);
    }

    #[test]
    fn test_escalation_message_carries_reading() {
        let mut agg = aggregator();
        let out = agg.apply_sensor_data(&event("M1", &[("sicaklik", 95.0)]), Utc::now());
        assert_eq!(out.new_alerts[0].message, "Temperature at critical level (95 C)");
    }

    #[test]
    fn test_sensor_history_view() {
        let mut agg = aggregator();
        for v in [40.0, 42.0, 44.0] {
            agg.apply_sensor_data(&event("M1", &[("sicaklik", v)]), Utc::now());
        }
        let view = agg
            .sensor_history("M1", "sicaklik", Utc::now(), TimeRange::OneHour)
            .unwrap();
        assert_eq!(view.points.len(), 3);
        assert!((view.stats.mean - 42.0).abs() < 1e-9);
        assert!(matches!(
            agg.sensor_history("M1", "gurultu", Utc::now(), TimeRange::OneHour),
            Err(DashboardError::UnknownSensor { .. })
        ));
    }
}
