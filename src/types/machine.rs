//! Machine state as held by the dashboard aggregator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::alert::Alert;
use super::sensor::SensorState;

/// Overall machine status.
///
/// `Maintenance` is only ever set through the manual override; the other
/// three are derived from sensor statuses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum MachineStatus {
    #[default]
    Operational,
    Warning,
    Error,
    Maintenance,
}

impl MachineStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Operational => "operational",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Maintenance => "maintenance",
        }
    }
}

impl std::fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One machine on the line with its live sensors and alert list.
#[derive(Debug, Clone, Serialize)]
pub struct MachineState {
    pub id: String,
    pub name: String,
    pub status: MachineStatus,
    /// Sticky manual override; while set, `status` stays `Maintenance`
    pub maintenance: bool,
    pub last_update: DateTime<Utc>,
    pub sensors: BTreeMap<String, SensorState>,
    pub alerts: Vec<Alert>,
}

impl MachineState {
    pub fn new(id: impl Into<String>, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: MachineStatus::Operational,
            maintenance: false,
            last_update: now,
            sensors: BTreeMap::new(),
            alerts: Vec::new(),
        }
    }

    pub fn active_alert_count(&self) -> usize {
        self.alerts.iter().filter(|a| !a.acknowledged).count()
    }
}

/// Compact row for machine list views.
#[derive(Debug, Clone, Serialize)]
pub struct MachineSummary {
    pub id: String,
    pub name: String,
    pub status: MachineStatus,
    pub sensor_count: usize,
    pub active_alerts: usize,
    pub last_update: DateTime<Utc>,
}

impl From<&MachineState> for MachineSummary {
    fn from(m: &MachineState) -> Self {
        Self {
            id: m.id.clone(),
            name: m.name.clone(),
            status: m.status,
            sensor_count: m.sensors.len(),
            active_alerts: m.active_alert_count(),
            last_update: m.last_update,
        }
    }
}
