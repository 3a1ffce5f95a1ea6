//! Event processing loop shared across input modes, plus the periodic
//! refresh timer.

use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::source::{EventSource, HubEvent};
use super::DashboardService;
use crate::types::SensorStatus;

/// Counters returned when the loop stops.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoopStats {
    pub sensor_events: u64,
    pub anomaly_events: u64,
    pub alerts_raised: u64,
}

/// Drives events from a source through the dashboard service until the
/// source ends or cancellation.
pub struct ProcessingLoop {
    service: DashboardService,
    cancel_token: CancellationToken,
}

impl ProcessingLoop {
    pub fn new(service: DashboardService, cancel_token: CancellationToken) -> Self {
        Self {
            service,
            cancel_token,
        }
    }

    pub async fn run<S: EventSource>(self, source: &mut S) -> LoopStats {
        let mut stats = LoopStats::default();
        info!("[EventProcessor] Processing events from {}", source.source_name());

        loop {
            let event = tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("[EventProcessor] Shutdown signal received");
                    break;
                }
                result = source.next_event() => match result {
                    Ok(ev) => ev,
                    Err(e) => {
                        warn!("[EventProcessor] Source error: {}", e);
                        break;
                    }
                },
            };

            match event {
                HubEvent::SensorData(data) => {
                    stats.sensor_events += 1;
                    let outcome = self.service.handle_sensor_data(&data).await;
                    stats.alerts_raised += outcome.new_alerts.len() as u64;

                    let worst = outcome
                        .machine
                        .sensors
                        .values()
                        .map(|s| s.status)
                        .max()
                        .unwrap_or_default();
                    if worst == SensorStatus::Danger {
                        warn!(
                            machine_id = %outcome.machine.id,
                            total_score = outcome.analysis.total_score,
                            alarm = %outcome.analysis.alarm_level,
                            "[EventProcessor] Sensor in danger"
                        );
                    }

                    if stats.sensor_events % 50 == 0 {
                        info!(
                            "[EventProcessor] Progress: {} sensor events | {} anomaly alerts | {} alerts raised",
                            stats.sensor_events, stats.anomaly_events, stats.alerts_raised
                        );
                    }
                }
                HubEvent::AnomalyAlert(alert) => {
                    stats.anomaly_events += 1;
                    info!(
                        machine_id = %alert.machine_id,
                        score = alert.score,
                        level = %alert.alarm_level,
                        "[EventProcessor] Anomaly alert received"
                    );
                    self.service.handle_anomaly_alert(&alert).await;
                }
                HubEvent::Eof => {
                    info!(
                        "[EventProcessor] Source reached end ({} sensor events processed)",
                        stats.sensor_events
                    );
                    break;
                }
            }
        }

        info!(
            sensor_events = stats.sensor_events,
            anomaly_events = stats.anomaly_events,
            alerts_raised = stats.alerts_raised,
            "[EventProcessor] Stopped"
        );
        stats
    }
}

/// Ask the backend for a fresh reading every `interval` until cancelled.
/// Failures are logged and the timer keeps going.
pub async fn run_refresh_timer(service: DashboardService, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!(interval_secs = interval.as_secs(), "[RefreshTimer] Started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = service.refresh().await {
                    warn!(error = %e, "[RefreshTimer] Refresh request failed");
                }
            }
        }
    }
    info!("[RefreshTimer] Stopped");
}
