//! Trend Detector

use crate::types::Trend;

/// Direction from the previous value to `current`. With no previous value
/// the reading is its own baseline and the trend is stable.
pub fn detect(current: f64, previous: Option<f64>) -> Trend {
    let previous = previous.unwrap_or(current);
    if current > previous {
        Trend::Up
    } else if current < previous {
        Trend::Down
    } else {
        Trend::Stable
    }
}
