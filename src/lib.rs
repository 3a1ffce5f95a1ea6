//! LineWatch: production line sensor monitoring
//!
//! Streams sensor readings and anomaly alerts from a push hub, classifies
//! each reading against its normal range, tracks per-machine history and
//! status, and serves the resulting views over a JSON API.
//!
//! ## Architecture
//!
//! - **Hub**: push connection with fixed-delay reconnect and typed subscriptions
//! - **Processing**: deviation scoring, trend, history windows, alarm analysis
//! - **Pipeline**: aggregator state, published topics and notifications
//! - **API**: read views and operator actions under `/api/v1`

pub mod api;
pub mod backend;
pub mod config;
pub mod hub;
pub mod pipeline;
pub mod processing;
pub mod types;

pub use config::MonitorConfig;

pub use types::{
    Alert, AlertSeverity, AnalysisSnapshot, AnomalyAlertEvent, MachineState, MachineStatus,
    SensorDataEvent, SensorKind, SensorStatus, Trend,
};

pub use hub::{ConnectionState, HubClient, HubError};

pub use pipeline::{DashboardAggregator, DashboardError, DashboardService};
