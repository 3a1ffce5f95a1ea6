//! Processing Pipeline Module
//!
//! ```text
//! hub subscription / stdin ──► ProcessingLoop ──► DashboardService
//!                                                    │
//!                          DashboardAggregator ◄─────┤ (RwLock)
//!                          DashboardTopics     ◄─────┤ machine, analysis, anomaly, alerts
//!                          Notifier            ◄─────┘ fire-and-forget
//! ```

pub mod aggregator;
mod notifier;
pub mod processing_loop;
mod service;
pub mod source;
pub mod topics;

pub use aggregator::{
    AggregatorSettings, AggregatorStats, AnomalyOutcome, DashboardAggregator, SensorDataOutcome,
    SensorHistoryView,
};
pub use notifier::Notifier;
pub use processing_loop::{run_refresh_timer, LoopStats, ProcessingLoop};
pub use service::DashboardService;
pub use topics::{DashboardTopics, Topic};

use crate::backend::BackendError;

/// Errors surfaced by dashboard operations.
#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error("Unknown machine '{0}'")]
    UnknownMachine(String),

    #[error("Unknown alert '{0}'")]
    UnknownAlert(String),

    #[error("Machine '{machine_id}' has no sensor '{sensor}'")]
    UnknownSensor { machine_id: String, sensor: String },

    #[error("Backend request failed: {0}")]
    Backend(#[from] BackendError),
}
