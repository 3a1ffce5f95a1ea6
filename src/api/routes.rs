//! API route definitions
//!
//! - /api/v1/health, /api/v1/status - liveness and connection status
//! - /api/v1/machines - machine list, detail and maintenance toggle
//! - /api/v1/overview - line-wide health, energy and critical sensors
//! - /api/v1/analysis, /api/v1/anomaly - latest analysis and upstream anomaly
//! - /api/v1/sensors/:key/history, /api/v1/trends - windowed views
//! - /api/v1/alerts - active alerts and acknowledgment
//! - /api/v1/refresh, /api/v1/test/anomaly - backend triggers

use axum::{routing::{get, post}, Router};

use super::handlers::{self, DashboardState};

/// Create all API routes for the dashboard
pub fn api_routes(state: DashboardState) -> Router {
    Router::new()
        .route("/health", get(handlers::get_health))
        .route("/status", get(handlers::get_status))
        .route("/machines", get(handlers::list_machines))
        .route("/machines/:id", get(handlers::get_machine))
        .route("/machines/:id/maintenance", post(handlers::toggle_maintenance))
        .route("/overview", get(handlers::get_overview))
        .route("/analysis", get(handlers::get_analysis))
        .route("/anomaly", get(handlers::get_anomaly))
        .route("/sensors/:key/history", get(handlers::get_sensor_history))
        .route("/trends", get(handlers::get_trends))
        .route("/alerts", get(handlers::get_alerts))
        .route("/alerts/:id/acknowledge", post(handlers::acknowledge_alert))
        // Backend triggers
        .route("/refresh", post(handlers::refresh))
        .route("/test/anomaly", post(handlers::trigger_test_anomaly))
        .with_state(state)
}
