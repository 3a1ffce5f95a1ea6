//! Operator alerts raised on machines

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alert severity. `Ord` puts `High` last; use [`AlertSeverity::rank`] for
/// most-severe-first sorting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
}

impl AlertSeverity {
    /// Map a deviation or anomaly score onto a severity.
    ///
    /// Anything below the medium band is still `Low`: an alert is never
    /// raised without a severity.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.7 {
            Self::High
        } else if score >= 0.5 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Sort key, most severe first.
    pub const fn rank(self) -> u8 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }

    /// Score reported to the notification service for this severity.
    pub const fn notification_score(self) -> f64 {
        match self {
            Self::High => 0.9,
            Self::Medium => 0.7,
            Self::Low => 0.4,
        }
    }

    /// Operator action text sent with notifications.
    pub const fn action_message(self) -> &'static str {
        match self {
            Self::High => "Immediate intervention required! Check the machine and take the necessary precautions.",
            Self::Medium => "Should be checked soon. A drop in performance is possible.",
            Self::Low => "Can be reviewed during the routine inspection.",
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::str::FromStr for AlertSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown alert severity '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AlertCategory {
    Maintenance,
    System,
    Performance,
    Anomaly,
}

impl std::str::FromStr for AlertCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "maintenance" => Ok(Self::Maintenance),
            "system" => Ok(Self::System),
            "performance" => Ok(Self::Performance),
            "anomaly" => Ok(Self::Anomaly),
            other => Err(format!("unknown alert category '{other}'")),
        }
    }
}

/// An alert attached to a machine. Never deleted; acknowledging is the only
/// mutation and removes it from active views.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub id: String,
    pub machine_id: String,
    pub severity: AlertSeverity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub acknowledged: bool,
    pub category: AlertCategory,
}

/// Filter for the active-alert view. `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub category: Option<AlertCategory>,
    pub severity: Option<AlertSeverity>,
    /// Only alerts raised within this many hours before `now`
    pub since_hours: Option<f64>,
}

impl AlertFilter {
    pub fn matches(&self, alert: &Alert, now: DateTime<Utc>) -> bool {
        if alert.acknowledged {
            return false;
        }
        if self.category.is_some_and(|c| c != alert.category) {
            return false;
        }
        if self.severity.is_some_and(|s| s != alert.severity) {
            return false;
        }
        if let Some(hours) = self.since_hours {
            #[allow(clippy::cast_precision_loss)]
            let age_hours = (now - alert.timestamp).num_milliseconds() as f64 / 3_600_000.0;
            if age_hours > hours {
                return false;
            }
        }
        true
    }
}
