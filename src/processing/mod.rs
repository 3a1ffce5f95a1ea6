//! Reducer pipeline - pure per-reading and per-machine computations
//!
//! Nothing in here touches I/O or shared state; the dashboard aggregator
//! calls these in order for every sensor-data event.

pub mod analysis;
pub mod classifier;
pub mod history;
pub mod machine_status;
pub mod trend;

pub use classifier::{classify, deviation_score, status_for_score, thresholds_for, Classification};
pub use history::{HistoryStats, SensorHistory, TimeRange};
