//! Rolling History Buffer
//!
//! Bounded FIFO of `{timestamp, value}` per sensor. Entries keep strict
//! arrival order; a reading with an older timestamp than its predecessor is
//! still appended at the back.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize, Serializer};
use statrs::statistics::Statistics;
use std::collections::VecDeque;

use crate::types::HistoryPoint;

// ============================================================================
// Time Ranges
// ============================================================================

/// Window selector used by history and trend views.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum TimeRange {
    #[default]
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "24h")]
    OneDay,
}

impl TimeRange {
    pub const fn minutes(self) -> i64 {
        match self {
            Self::OneHour => 60,
            Self::SixHours => 360,
            Self::OneDay => 1440,
        }
    }

    pub fn duration(self) -> Duration {
        Duration::minutes(self.minutes())
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneHour => "1h",
            Self::SixHours => "6h",
            Self::OneDay => "24h",
        }
    }
}

impl std::str::FromStr for TimeRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1h" => Ok(Self::OneHour),
            "6h" => Ok(Self::SixHours),
            "24h" => Ok(Self::OneDay),
            other => Err(format!("unknown time range '{other}' (expected 1h, 6h or 24h)")),
        }
    }
}

// ============================================================================
// Buffer
// ============================================================================

/// Summary statistics over a history window.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Default)]
pub struct HistoryStats {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
}

#[derive(Debug, Clone)]
pub struct SensorHistory {
    capacity: usize,
    entries: VecDeque<HistoryPoint>,
}

impl SensorHistory {
    /// A capacity of 0 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a point, evicting the oldest when full.
    pub fn push(&mut self, timestamp: DateTime<Utc>, value: f64) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(HistoryPoint { timestamp, value });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryPoint> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&HistoryPoint> {
        self.entries.back()
    }

    pub fn to_vec(&self) -> Vec<HistoryPoint> {
        self.entries.iter().copied().collect()
    }

    /// Entries with `timestamp >= now - range`, in buffer order.
    pub fn window(&self, now: DateTime<Utc>, range: TimeRange) -> Vec<HistoryPoint> {
        let cutoff = now - range.duration();
        self.entries
            .iter()
            .filter(|p| p.timestamp >= cutoff)
            .copied()
            .collect()
    }

    /// Mean over the window; 0 when the window is empty.
    pub fn average(&self, now: DateTime<Utc>, range: TimeRange) -> f64 {
        self.stats(now, range).mean
    }

    pub fn stats(&self, now: DateTime<Utc>, range: TimeRange) -> HistoryStats {
        let values: Vec<f64> = self.window(now, range).iter().map(|p| p.value).collect();
        if values.is_empty() {
            return HistoryStats::default();
        }

        // std_dev is the sample deviation and undefined below two points
        let std_dev = if values.len() < 2 {
            0.0
        } else {
            Statistics::std_dev(&values)
        };

        HistoryStats {
            count: values.len(),
            mean: Statistics::mean(&values),
            min: Statistics::min(&values),
            max: Statistics::max(&values),
            std_dev,
        }
    }
}

impl Serialize for SensorHistory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.entries.iter())
    }
}
