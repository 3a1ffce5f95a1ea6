//! API route handlers
//!
//! Read endpoints take a read lock on the aggregator for the duration of
//! one view; mutating endpoints go through [`DashboardService`].

use axum::extract::{Path, Query, State};
use axum::response::Response;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::envelope::{ApiErrorResponse, ApiResponse};
use crate::hub::{ConnectionState, HubClient, HubStats};
use crate::pipeline::{AggregatorStats, DashboardService};
use crate::processing::TimeRange;
use crate::types::{AlertCategory, AlertFilter, AlertSeverity};

// ============================================================================
// API State
// ============================================================================

/// Shared state for API handlers
#[derive(Clone)]
pub struct DashboardState {
    pub service: DashboardService,
    /// Live hub connection; `None` when events come from stdin
    pub hub: Option<HubClient>,
}

impl DashboardState {
    pub fn new(service: DashboardService, hub: Option<HubClient>) -> Self {
        Self { service, hub }
    }
}

// ============================================================================
// Health / Status
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
}

pub async fn get_health() -> Response {
    ApiResponse::ok(HealthResponse {
        status: "ok",
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub connected: bool,
    pub connection: ConnectionState,
    pub uptime_secs: u64,
    pub machine_count: usize,
    pub active_machine: Option<String>,
    pub events: AggregatorStats,
    pub hub: Option<HubStats>,
}

pub async fn get_status(State(state): State<DashboardState>) -> Response {
    let agg = state.service.read().await;
    let connection = state
        .hub
        .as_ref()
        .map_or(ConnectionState::Disconnected, HubClient::state);

    ApiResponse::ok(StatusResponse {
        connected: connection == ConnectionState::Connected,
        connection,
        uptime_secs: state.service.uptime_secs(),
        machine_count: agg.machines().len(),
        active_machine: agg.active_machine().map(|m| m.id.clone()),
        events: agg.stats().clone(),
        hub: state.hub.as_ref().map(HubClient::stats),
    })
}

// ============================================================================
// Machines
// ============================================================================

pub async fn list_machines(State(state): State<DashboardState>) -> Response {
    let machines = state.service.read().await.machines();
    ApiResponse::ok(machines)
}

pub async fn get_machine(State(state): State<DashboardState>, Path(id): Path<String>) -> Response {
    let agg = state.service.read().await;
    match agg.machine(&id) {
        Some(machine) => ApiResponse::ok(machine),
        None => ApiErrorResponse::not_found(format!("Unknown machine '{id}'")),
    }
}

pub async fn toggle_maintenance(State(state): State<DashboardState>, Path(id): Path<String>) -> Response {
    match state.service.toggle_maintenance(&id).await {
        Ok(machine) => ApiResponse::ok(machine),
        Err(e) => e.into(),
    }
}

// ============================================================================
// Analysis / History / Trends
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct ViewQuery {
    /// Machine id; defaults to the machine of the latest event
    pub machine: Option<String>,
    /// `1h`, `6h` or `24h`
    pub range: Option<String>,
}

impl ViewQuery {
    fn time_range(&self) -> Result<TimeRange, Response> {
        match self.range.as_deref() {
            None => Ok(TimeRange::default()),
            Some(raw) => raw.parse().map_err(ApiErrorResponse::bad_request),
        }
    }
}

/// Resolve the requested machine or fall back to the active one.
fn resolve_machine(state: &crate::pipeline::DashboardAggregator, query: &ViewQuery) -> Result<String, Response> {
    match &query.machine {
        Some(id) => Ok(id.clone()),
        None => state
            .active_machine()
            .map(|m| m.id.clone())
            .ok_or_else(|| ApiErrorResponse::not_found("No machine has reported yet")),
    }
}

pub async fn get_analysis(State(state): State<DashboardState>, Query(query): Query<ViewQuery>) -> Response {
    let Some(machine_id) = query.machine else {
        return ApiResponse::ok(state.service.topics().analysis.latest());
    };
    let result = state.service.read().await.analysis_for(&machine_id, Utc::now());
    match result {
        Ok(snapshot) => ApiResponse::ok(snapshot),
        Err(e) => e.into(),
    }
}

/// Line-wide overview across every machine.
pub async fn get_overview(State(state): State<DashboardState>) -> Response {
    let overview = state.service.read().await.overview(Utc::now());
    ApiResponse::ok(overview)
}

pub async fn get_anomaly(State(state): State<DashboardState>) -> Response {
    ApiResponse::ok(state.service.topics().anomaly.latest())
}

pub async fn get_sensor_history(
    State(state): State<DashboardState>,
    Path(key): Path<String>,
    Query(query): Query<ViewQuery>,
) -> Response {
    let range = match query.time_range() {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let agg = state.service.read().await;
    let machine_id = match resolve_machine(&agg, &query) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match agg.sensor_history(&machine_id, &key, Utc::now(), range) {
        Ok(view) => ApiResponse::ok(view),
        Err(e) => e.into(),
    }
}

pub async fn get_trends(State(state): State<DashboardState>, Query(query): Query<ViewQuery>) -> Response {
    let range = match query.time_range() {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let agg = state.service.read().await;
    let machine_id = match resolve_machine(&agg, &query) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match agg.trends(&machine_id, Utc::now(), range) {
        Ok(summary) => ApiResponse::ok(summary),
        Err(e) => e.into(),
    }
}

// ============================================================================
// Alerts
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct AlertQuery {
    pub category: Option<String>,
    pub severity: Option<String>,
    pub since_hours: Option<f64>,
}

impl AlertQuery {
    fn to_filter(&self) -> Result<AlertFilter, String> {
        let category = self
            .category
            .as_deref()
            .map(str::parse::<AlertCategory>)
            .transpose()?;
        let severity = self
            .severity
            .as_deref()
            .map(str::parse::<AlertSeverity>)
            .transpose()?;
        Ok(AlertFilter {
            category,
            severity,
            since_hours: self.since_hours,
        })
    }
}

pub async fn get_alerts(State(state): State<DashboardState>, Query(query): Query<AlertQuery>) -> Response {
    let filter = match query.to_filter() {
        Ok(f) => f,
        Err(msg) => return ApiErrorResponse::bad_request(msg),
    };
    let alerts = state.service.read().await.active_alerts(&filter, Utc::now());
    ApiResponse::ok(alerts)
}

pub async fn acknowledge_alert(State(state): State<DashboardState>, Path(id): Path<String>) -> Response {
    match state.service.acknowledge_alert(&id).await {
        Ok(alert) => ApiResponse::ok(alert),
        Err(e) => e.into(),
    }
}

// ============================================================================
// Backend Triggers
// ============================================================================

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub requested: &'static str,
}

pub async fn refresh(State(state): State<DashboardState>) -> Response {
    match state.service.refresh().await {
        Ok(()) => ApiResponse::accepted(TriggerResponse { requested: "sensor-data" }),
        Err(e) => e.into(),
    }
}

pub async fn trigger_test_anomaly(State(state): State<DashboardState>) -> Response {
    match state.service.trigger_test_anomaly().await {
        Ok(()) => ApiResponse::accepted(TriggerResponse { requested: "anomaly-alert" }),
        Err(e) => e.into(),
    }
}
