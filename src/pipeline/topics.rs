//! Typed pub/sub topics for derived view models
//!
//! Latest-value topics are `watch` channels: a subscriber always sees the
//! newest value and may skip intermediate ones. Notifications are a
//! `broadcast` stream where every event matters.

use std::sync::Arc;
use tokio::sync::{broadcast, watch};

use crate::types::{Alert, AnalysisSnapshot, AnomalyAlertEvent, MachineState, NotificationEvent};

const NOTIFICATION_CAPACITY: usize = 64;

/// Latest-value topic. Clones publish to the same channel.
#[derive(Debug)]
pub struct Topic<T> {
    tx: Arc<watch::Sender<T>>,
}

impl<T> Clone for Topic<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T: Clone> Topic<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Replace the current value; succeeds with or without subscribers.
    pub fn publish(&self, value: T) {
        self.tx.send_replace(value);
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }

    pub fn latest(&self) -> T {
        self.tx.borrow().clone()
    }
}

/// Every topic the pipeline publishes on.
#[derive(Clone)]
pub struct DashboardTopics {
    /// Machine touched by the latest event
    pub machine: Topic<Option<MachineState>>,
    /// Analysis of that machine
    pub analysis: Topic<AnalysisSnapshot>,
    /// Latest upstream anomaly alert, as received
    pub anomaly: Topic<Option<AnomalyAlertEvent>>,
    /// Active alerts across all machines
    pub alerts: Topic<Vec<Alert>>,
    pub notifications: broadcast::Sender<NotificationEvent>,
}

impl DashboardTopics {
    pub fn new() -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            machine: Topic::new(None),
            analysis: Topic::new(AnalysisSnapshot::default()),
            anomaly: Topic::new(None),
            alerts: Topic::new(Vec::new()),
            notifications,
        }
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<NotificationEvent> {
        self.notifications.subscribe()
    }
}

impl Default for DashboardTopics {
    fn default() -> Self {
        Self::new()
    }
}
