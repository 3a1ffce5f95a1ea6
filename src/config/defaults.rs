//! System-wide default constants.
//!
//! Centralises magic numbers used by the monitor. Grouped by subsystem for
//! easy discovery. Most of these are only the fallback values for the
//! matching `linewatch.toml` keys.

// ============================================================================
// Classification
// ============================================================================

/// Per-sensor score at or above which a reading is `danger`.
pub const SENSOR_DANGER_SCORE: f64 = 0.7;

/// Per-sensor score at or above which a reading is `warning`.
pub const SENSOR_WARNING_SCORE: f64 = 0.3;

/// Whole-system score at or above which the alarm level is `high`.
pub const ALARM_HIGH_SCORE: f64 = 0.7;

/// Whole-system score at or above which the alarm level is `medium`.
pub const ALARM_MEDIUM_SCORE: f64 = 0.5;

/// Whole-system score at or above which the alarm level is `low`.
pub const ALARM_LOW_SCORE: f64 = 0.3;

/// Fleet health score at or above which the line is `healthy`.
pub const FLEET_HEALTHY_SCORE: f64 = 0.8;

/// Fleet health score at or above which the line is `warning`; below is `danger`.
pub const FLEET_WARNING_SCORE: f64 = 0.6;

/// Warning threshold offset above the normal-range maximum, as a fraction
/// of the normal-range width.
pub const WARNING_MARGIN: f64 = 0.0;

/// Danger threshold offset above the normal-range maximum, as a fraction
/// of the normal-range width.
pub const DANGER_MARGIN: f64 = 0.3;

// ============================================================================
// History
// ============================================================================

/// Rolling history capacity per sensor (readings).
pub const HISTORY_CAPACITY: usize = 50;

// ============================================================================
// Push Hub
// ============================================================================

/// Default hub address (host:port).
pub const HUB_ADDR: &str = "127.0.0.1:5006";

/// Event name carrying sensor readings.
pub const SENSOR_DATA_EVENT: &str = "ReceiveSensorData";

/// Event name carrying upstream anomaly alerts.
pub const ANOMALY_ALERT_EVENT: &str = "ReceiveAnomalyAlert";

/// Fixed delay between connection attempts (seconds). No backoff, no cap.
pub const HUB_RETRY_DELAY_SECS: u64 = 3;

/// Interval between client keep-alive pings (seconds).
pub const HUB_KEEP_ALIVE_SECS: u64 = 15;

/// Silence from the hub longer than this drops the connection (seconds).
pub const HUB_SERVER_TIMEOUT_SECS: u64 = 30;

/// Maximum time to wait for the connect + handshake exchange (seconds).
pub const HUB_HANDSHAKE_TIMEOUT_SECS: u64 = 15;

// ============================================================================
// Backend
// ============================================================================

/// Base URL of the remote backend that owns test triggers, alert
/// acknowledgment and notification delivery.
pub const BACKEND_BASE_URL: &str = "http://localhost:5005";

/// Periodic refresh interval (seconds).
pub const REFRESH_INTERVAL_SECS: u64 = 30;

// ============================================================================
// Dashboard API
// ============================================================================

/// Default HTTP bind address for the dashboard API.
pub const SERVER_ADDR: &str = "0.0.0.0:8080";

/// Maximum number of active alerts returned by the alert view.
pub const MAX_ALERTS_TO_SHOW: usize = 50;

// ============================================================================
// Notifications
// ============================================================================

/// Recipients announced on the notification side-channel.
pub const NOTIFICATION_RECIPIENTS: &[&str] = &["operator@example.com", "supervisor@example.com"];

// ============================================================================
// Simulation
// ============================================================================

/// Default machine id used by the simulator and as the initial view.
pub const DEFAULT_MACHINE_ID: &str = "MACHINE-003";
