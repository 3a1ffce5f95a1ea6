//! Fire-and-forget notification dispatch

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::backend::BackendClient;
use crate::config::NotificationConfig;
use crate::types::{AlertSeverity, NotificationEvent, NotificationPayload};

#[derive(Clone)]
pub struct Notifier {
    backend: BackendClient,
    recipients: Vec<String>,
    enabled: bool,
    events: broadcast::Sender<NotificationEvent>,
}

impl Notifier {
    pub fn new(
        backend: BackendClient,
        config: &NotificationConfig,
        events: broadcast::Sender<NotificationEvent>,
    ) -> Self {
        Self {
            backend,
            recipients: config.recipients.clone(),
            enabled: config.enabled,
            events,
        }
    }

    /// Send a notification in the background. Failures are logged only.
    ///
    /// `at` is the time of the alert being reported, not of the send.
    /// Returns the task handle, or `None` when notifications are disabled.
    pub fn notify(
        &self,
        severity: AlertSeverity,
        messages: Vec<String>,
        at: DateTime<Utc>,
    ) -> Option<JoinHandle<()>> {
        if !self.enabled {
            return None;
        }

        let payload = NotificationPayload::for_severity(severity, messages, at);
        let backend = self.backend.clone();
        let recipients = self.recipients.clone();
        let events = self.events.clone();

        Some(tokio::spawn(async move {
            match backend.send_notification(&payload).await {
                Ok(()) => {
                    info!(level = %payload.alert_level, recipients = recipients.len(), "Notification sent");
                    let _ = events.send(NotificationEvent {
                        recipients,
                        alert_level: payload.alert_level,
                        messages: payload.messages,
                        sent_at: Utc::now(),
                    });
                }
                Err(e) => warn!(level = %payload.alert_level, error = %e, "Notification failed"),
            }
        }))
    }
}
