//! Event source abstraction for hub event ingestion.
//!
//! The processing loop reads typed events from either the live hub
//! subscriptions or JSON lines on stdin.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::config::HubConfig;
use crate::hub::Subscription;
use crate::types::{AnomalyAlertEvent, SensorDataEvent};

/// Events produced by an event source.
pub enum HubEvent {
    SensorData(SensorDataEvent),
    AnomalyAlert(AnomalyAlertEvent),
    /// Source has no more data
    Eof,
}

/// Trait abstracting where hub events come from.
///
/// The processing loop calls [`next_event`](EventSource::next_event) in a
/// `select!` with cancellation, so implementations must be cancel safe.
#[async_trait]
pub trait EventSource: Send + 'static {
    async fn next_event(&mut self) -> Result<HubEvent>;

    /// Human-readable name for logging.
    fn source_name(&self) -> &str;
}

// ============================================================================
// Hub Source
// ============================================================================

/// Reads from the two typed hub subscriptions.
pub struct HubSource {
    sensor_data: Subscription<SensorDataEvent>,
    anomaly_alerts: Subscription<AnomalyAlertEvent>,
}

impl HubSource {
    pub fn new(
        sensor_data: Subscription<SensorDataEvent>,
        anomaly_alerts: Subscription<AnomalyAlertEvent>,
    ) -> Self {
        Self {
            sensor_data,
            anomaly_alerts,
        }
    }
}

#[async_trait]
impl EventSource for HubSource {
    async fn next_event(&mut self) -> Result<HubEvent> {
        tokio::select! {
            Some(event) = self.sensor_data.recv() => Ok(HubEvent::SensorData(event)),
            Some(alert) = self.anomaly_alerts.recv() => Ok(HubEvent::AnomalyAlert(alert)),
            else => Ok(HubEvent::Eof),
        }
    }

    fn source_name(&self) -> &str {
        "hub"
    }
}

// ============================================================================
// Stdin Source (JSON events, one per line)
// ============================================================================

/// Reads hub events as JSON lines from stdin.
///
/// Each line is either a hub invocation record
/// (`{"type":1,"target":"ReceiveSensorData","arguments":[{..}]}`) or a bare
/// event payload; bare payloads with an `isAnomaly` field are anomaly alerts.
///
/// Used with the simulator: `simulation --stdout | linewatch --stdin`
pub struct StdinSource {
    reader: tokio::io::BufReader<tokio::io::Stdin>,
    line_buffer: String,
    sensor_event: String,
    anomaly_event: String,
}

impl StdinSource {
    pub fn new(hub: &HubConfig) -> Self {
        Self {
            reader: tokio::io::BufReader::new(tokio::io::stdin()),
            line_buffer: String::with_capacity(2048),
            sensor_event: hub.sensor_event.clone(),
            anomaly_event: hub.anomaly_event.clone(),
        }
    }
}

/// Decode one JSON line into an event. `Ok(None)` for invocations of other
/// targets.
pub fn parse_event_line(line: &str, sensor_event: &str, anomaly_event: &str) -> Result<Option<HubEvent>> {
    let value: Value = serde_json::from_str(line)?;

    let (target, payload) = match value.get("target").and_then(Value::as_str) {
        Some(target) => {
            let payload = value
                .get("arguments")
                .and_then(Value::as_array)
                .and_then(|args| args.first())
                .cloned()
                .unwrap_or_default();
            (Some(target.to_string()), payload)
        }
        None => (None, value),
    };

    let is_anomaly = match target.as_deref() {
        Some(t) if t == sensor_event => false,
        Some(t) if t == anomaly_event => true,
        Some(_) => return Ok(None),
        None => payload.get("isAnomaly").is_some(),
    };

    if is_anomaly {
        Ok(Some(HubEvent::AnomalyAlert(serde_json::from_value(payload)?)))
    } else {
        Ok(Some(HubEvent::SensorData(serde_json::from_value(payload)?)))
    }
}

#[async_trait]
impl EventSource for StdinSource {
    async fn next_event(&mut self) -> Result<HubEvent> {
        use tokio::io::AsyncBufReadExt;
        loop {
            self.line_buffer.clear();
            let bytes = self.reader.read_line(&mut self.line_buffer).await?;
            if bytes == 0 {
                return Ok(HubEvent::Eof);
            }
            let line = self.line_buffer.trim();
            if line.is_empty() {
                continue;
            }
            match parse_event_line(line, &self.sensor_event, &self.anomaly_event) {
                Ok(Some(event)) => return Ok(event),
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!("[StdinSource] Failed to parse event: {}", e);
                    // Skip malformed lines and keep reading
                }
            }
        }
    }

    fn source_name(&self) -> &str {
        "stdin"
    }
}
