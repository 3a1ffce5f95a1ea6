//! Dashboard Service - shared handle over the aggregator, topics and backend
//!
//! The processing loop and the HTTP API both go through this type. The
//! aggregator sits behind an `RwLock`; view models leave through the topics.

use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{info, warn};

use super::aggregator::{AggregatorSettings, DashboardAggregator, SensorDataOutcome};
use super::notifier::Notifier;
use super::topics::DashboardTopics;
use super::DashboardError;
use crate::backend::BackendClient;
use crate::config::MonitorConfig;
use crate::types::{Alert, AlertFilter, AnomalyAlertEvent, MachineState, SensorDataEvent};

#[derive(Clone)]
pub struct DashboardService {
    aggregator: Arc<RwLock<DashboardAggregator>>,
    topics: DashboardTopics,
    backend: BackendClient,
    notifier: Notifier,
    started: Instant,
}

impl DashboardService {
    pub fn new(config: &MonitorConfig, backend: BackendClient) -> Self {
        let topics = DashboardTopics::new();
        let notifier = Notifier::new(backend.clone(), &config.notifications, topics.notifications.clone());
        Self {
            aggregator: Arc::new(RwLock::new(DashboardAggregator::new(AggregatorSettings::from(config)))),
            topics,
            backend,
            notifier,
            started: Instant::now(),
        }
    }

    pub fn topics(&self) -> &DashboardTopics {
        &self.topics
    }

    pub fn backend(&self) -> &BackendClient {
        &self.backend
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    /// Read access for views.
    pub async fn read(&self) -> RwLockReadGuard<'_, DashboardAggregator> {
        self.aggregator.read().await
    }

    async fn publish_alerts(&self) {
        let alerts = self.aggregator.read().await.active_alerts(&AlertFilter::default(), Utc::now());
        self.topics.alerts.publish(alerts);
    }

    // ========================================================================
    // Hub Events
    // ========================================================================

    pub async fn handle_sensor_data(&self, event: &SensorDataEvent) -> SensorDataOutcome {
        let outcome = self
            .aggregator
            .write()
            .await
            .apply_sensor_data(event, Utc::now());

        self.topics.machine.publish(Some(outcome.machine.clone()));
        self.topics.analysis.publish(outcome.analysis.clone());
        if !outcome.new_alerts.is_empty() {
            for alert in &outcome.new_alerts {
                info!(machine_id = %alert.machine_id, severity = alert.severity.as_str(),
                    message = %alert.message, "Alert raised");
            }
            self.publish_alerts().await;
        }
        outcome
    }

    /// Republish an upstream anomaly alert and notify.
    pub async fn handle_anomaly_alert(&self, event: &AnomalyAlertEvent) {
        let received_at = Utc::now();
        let outcome = self
            .aggregator
            .write()
            .await
            .apply_anomaly_alert(event, received_at);

        self.topics.anomaly.publish(Some(event.clone()));
        if let Some(machine) = outcome.machine {
            self.topics.machine.publish(Some(machine));
        }
        if outcome.alert.is_some() {
            self.publish_alerts().await;
        }

        let messages = if event.messages.is_empty() {
            outcome.alert.map(|a| vec![a.message]).unwrap_or_default()
        } else {
            event.messages.clone()
        };
        let at = event.parsed_timestamp().unwrap_or(received_at);
        self.notifier.notify(outcome.severity, messages, at);
    }

    // ========================================================================
    // Operator Actions
    // ========================================================================

    pub async fn toggle_maintenance(&self, machine_id: &str) -> Result<MachineState, DashboardError> {
        let machine = self.aggregator.write().await.toggle_maintenance(machine_id)?;
        self.topics.machine.publish(Some(machine.clone()));
        Ok(machine)
    }

    /// Acknowledge through the backend first, then locally.
    pub async fn acknowledge_alert(&self, alert_id: &str) -> Result<Alert, DashboardError> {
        if self.aggregator.read().await.find_alert(alert_id).is_none() {
            return Err(DashboardError::UnknownAlert(alert_id.to_string()));
        }

        self.backend.acknowledge_alert(alert_id).await.map_err(|e| {
            warn!(alert_id, error = %e, "Backend rejected acknowledgment");
            e
        })?;

        let (alert, machine) = self.aggregator.write().await.acknowledge_alert(alert_id)?;
        self.topics.machine.publish(Some(machine));
        self.publish_alerts().await;
        self.notifier
            .notify(alert.severity, vec![alert.message.clone()], alert.timestamp);
        info!(alert_id, "Alert acknowledged");
        Ok(alert)
    }

    /// Ask the backend for a fresh reading.
    pub async fn refresh(&self) -> Result<(), DashboardError> {
        self.backend.trigger_test_reading().await?;
        Ok(())
    }

    pub async fn trigger_test_anomaly(&self) -> Result<(), DashboardError> {
        self.backend.trigger_test_anomaly().await?;
        Ok(())
    }
}
