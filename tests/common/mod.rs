//! Shared helpers for integration tests: a recording fake backend and
//! event builders.

#![allow(dead_code)]

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;
use std::sync::{Arc, Mutex};

use linewatch::backend::BackendClient;
use linewatch::config::MonitorConfig;
use linewatch::pipeline::DashboardService;
use linewatch::types::{AnomalyAlertEvent, SensorDataEvent, SensorValue};

/// Requests seen by the fake backend, as `"POST /path"` lines.
#[derive(Clone, Default)]
pub struct Recorded {
    pub requests: Arc<Mutex<Vec<String>>>,
    pub notifications: Arc<Mutex<Vec<Value>>>,
}

impl Recorded {
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn notifications(&self) -> Vec<Value> {
        self.notifications.lock().unwrap().clone()
    }
}

async fn ack(State(rec): State<Recorded>, Path(id): Path<String>) -> StatusCode {
    rec.requests.lock().unwrap().push(format!("POST /alerts/{id}/acknowledge"));
    if id.starts_with("REJECT") {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    }
}

async fn notify(State(rec): State<Recorded>, Json(body): Json<Value>) -> StatusCode {
    rec.requests.lock().unwrap().push("POST /notification/send-email".to_string());
    rec.notifications.lock().unwrap().push(body);
    StatusCode::OK
}

async fn test_reading(State(rec): State<Recorded>) -> StatusCode {
    rec.requests.lock().unwrap().push("POST /test/sensor-data".to_string());
    StatusCode::OK
}

async fn test_anomaly(State(rec): State<Recorded>) -> StatusCode {
    rec.requests.lock().unwrap().push("POST /test/anomaly-alert".to_string());
    StatusCode::OK
}

/// Start a fake backend on an ephemeral port. Returns its base URL.
pub async fn spawn_backend() -> (String, Recorded) {
    let recorded = Recorded::default();
    let app = Router::new()
        .route("/alerts/:id/acknowledge", post(ack))
        .route("/notification/send-email", post(notify))
        .route("/test/sensor-data", post(test_reading))
        .route("/test/anomaly-alert", post(test_anomaly))
        .with_state(recorded.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), recorded)
}

/// Base URL that refuses connections.
pub async fn unreachable_backend() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

pub fn service_with_backend(base_url: &str) -> DashboardService {
    let mut config = MonitorConfig::default();
    config.backend.base_url = base_url.to_string();
    let backend = BackendClient::new(base_url).unwrap();
    DashboardService::new(&config, backend)
}

pub fn sensor_event(machine_id: &str, timestamp: &str, readings: &[(&str, f64)]) -> SensorDataEvent {
    SensorDataEvent {
        machine_id: machine_id.to_string(),
        timestamp: timestamp.to_string(),
        sensors: readings
            .iter()
            .map(|(key, value)| {
                (
                    (*key).to_string(),
                    SensorValue {
                        value: *value,
                        unit: String::new(),
                    },
                )
            })
            .collect(),
    }
}

pub fn anomaly_event(machine_id: &str, score: f64, level: &str, messages: &[&str]) -> AnomalyAlertEvent {
    AnomalyAlertEvent {
        machine_id: machine_id.to_string(),
        timestamp: "2026-03-01T10:05:00Z".to_string(),
        is_anomaly: true,
        score,
        alarm_level: level.to_string(),
        messages: messages.iter().map(|m| (*m).to_string()).collect(),
        sensor_data: Default::default(),
    }
}

/// Wait until `f` holds, polling every 10ms for up to 2s.
pub async fn eventually(mut f: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if f() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    f()
}
