//! Wire payloads: inbound hub events and outbound notifications

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::alert::AlertSeverity;
use super::sensor::{Reading, SensorKind};

/// `{value, unit}` pair as carried in hub payloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorValue {
    pub value: f64,
    #[serde(default)]
    pub unit: String,
}

/// Sensor-data event pushed by the hub.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SensorDataEvent {
    pub machine_id: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub sensors: BTreeMap<String, SensorValue>,
}

impl SensorDataEvent {
    /// Event timestamp, or `None` when missing or unparseable.
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.timestamp)
    }

    /// Flatten the payload into readings stamped `ts`. A missing unit falls
    /// back to the sensor table.
    pub fn readings(&self, ts: DateTime<Utc>) -> Vec<Reading> {
        self.sensors
            .iter()
            .map(|(key, sv)| Reading {
                sensor_key: key.clone(),
                value: sv.value,
                unit: if sv.unit.is_empty() {
                    SensorKind::from_key(key).map_or("", SensorKind::unit).to_string()
                } else {
                    sv.unit.clone()
                },
                timestamp: ts,
            })
            .collect()
    }
}

/// Anomaly-alert event pushed by the hub. Score and level are computed
/// upstream and taken as-is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyAlertEvent {
    pub machine_id: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub is_anomaly: bool,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub alarm_level: String,
    #[serde(default)]
    pub messages: Vec<String>,
    #[serde(default)]
    pub sensor_data: BTreeMap<String, SensorValue>,
}

impl AnomalyAlertEvent {
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.timestamp)
    }
}

/// Parse an ISO8601 timestamp. Values without an offset are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

// ============================================================================
// Notifications
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TypeInfo {
    pub action: String,
}

/// Body of `POST /notification/send-email`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationPayload {
    pub alert_level: String,
    pub anomaly_score: f64,
    pub timestamp: String,
    pub messages: Vec<String>,
    pub type_info: TypeInfo,
}

impl NotificationPayload {
    /// Build the payload for an alert of the given severity.
    pub fn for_severity(severity: AlertSeverity, messages: Vec<String>, at: DateTime<Utc>) -> Self {
        Self {
            alert_level: severity.as_str().to_string(),
            anomaly_score: severity.notification_score(),
            timestamp: at.to_rfc3339(),
            messages,
            type_info: TypeInfo {
                action: severity.action_message().to_string(),
            },
        }
    }
}

/// Published after the backend accepted a notification.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationEvent {
    pub recipients: Vec<String>,
    pub alert_level: String,
    pub messages: Vec<String>,
    pub sent_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_data_event_camel_case() {
        let json = r#"{"machineId":"M1","timestamp":"2024-03-01T10:00:00Z",
            "sensors":{"sicaklik":{"value":95,"unit":"C"}}}"#;
        let event: SensorDataEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.machine_id, "M1");
        assert_eq!(event.sensors["sicaklik"].value, 95.0);
        assert!(event.parsed_timestamp().is_some());
    }

    #[test]
    fn test_readings_fill_missing_units() {
        let json = r#"{"machineId":"M1","sensors":{
            "basinc":{"value":1.1},"nem":{"value":40},"sicaklik":{"value":70,"unit":"F"}}}"#;
        let event: SensorDataEvent = serde_json::from_str(json).unwrap();
        let ts = Utc::now();
        let readings = event.readings(ts);
        let units: Vec<(&str, &str)> = readings
            .iter()
            .map(|r| (r.sensor_key.as_str(), r.unit.as_str()))
            .collect();
        assert_eq!(units, vec![("basinc", "bar"), ("nem", ""), ("sicaklik", "F")]);
        assert!(readings.iter().all(|r| r.timestamp == ts));
    }

    #[test]
    fn test_missing_timestamp_is_none() {
        let event: SensorDataEvent =
            serde_json::from_str(r#"{"machineId":"M1","sensors":{}}"#).unwrap();
        assert!(event.parsed_timestamp().is_none());
    }

    #[test]
    fn test_naive_timestamp_taken_as_utc() {
        let ts = parse_timestamp("2024-03-01T10:00:00.250").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-01T10:00:00.250+00:00");
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_anomaly_event_defaults() {
        let event: AnomalyAlertEvent =
            serde_json::from_str(r#"{"machineId":"M2","isAnomaly":true,"score":0.8}"#).unwrap();
        assert!(event.is_anomaly);
        assert!(event.messages.is_empty());
        assert!(event.sensor_data.is_empty());
    }

    #[test]
    fn test_notification_payload_wire_shape() {
        let payload = NotificationPayload::for_severity(
            AlertSeverity::Medium,
            vec!["check line".to_string()],
            Utc::now(),
        );
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["alert_level"], "medium");
        assert_eq!(value["anomaly_score"], 0.7);
        assert!(value["type_info"]["action"].is_string());
    }
}
