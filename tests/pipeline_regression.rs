//! Pipeline Regression Tests
//!
//! Drives hub events through `DashboardService` and `ProcessingLoop` and
//! asserts on machine state, published topics, alerts and notifications.
//! The backend is an in-process fake on an ephemeral port.

mod common;

use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use common::{
    anomaly_event, eventually, sensor_event, service_with_backend, spawn_backend, unreachable_backend,
};
use linewatch::backend::BackendClient;
use linewatch::config::{MonitorConfig, NotificationConfig};
use linewatch::pipeline::source::{parse_event_line, EventSource, HubEvent};
use linewatch::pipeline::{run_refresh_timer, DashboardService, Notifier, ProcessingLoop};
use linewatch::processing::TimeRange;
use linewatch::types::{
    AlarmLevel, AlertCategory, AlertFilter, AlertSeverity, MachineStatus, SensorStatus, Trend,
};

/// Replays a fixed list of events, then reports end of input.
struct ScriptedSource {
    events: VecDeque<HubEvent>,
}

#[async_trait]
impl EventSource for ScriptedSource {
    async fn next_event(&mut self) -> anyhow::Result<HubEvent> {
        Ok(self.events.pop_front().unwrap_or(HubEvent::Eof))
    }

    fn source_name(&self) -> &str {
        "scripted"
    }
}

fn now_rfc3339(offset_secs: i64) -> String {
    (Utc::now() + chrono::Duration::seconds(offset_secs)).to_rfc3339()
}

#[tokio::test]
async fn overheating_machine_escalates_to_error_with_high_alarm() {
    let (url, _rec) = spawn_backend().await;
    let service = service_with_backend(&url);
    let mut machine_rx = service.topics().machine.subscribe();

    let outcome = service
        .handle_sensor_data(&sensor_event("MACHINE-003", &now_rfc3339(0), &[("sicaklik", 95.0)]))
        .await;

    let temp = &outcome.machine.sensors["sicaklik"];
    assert_eq!(temp.status, SensorStatus::Danger);
    assert!((temp.score - 15.0 / 18.0).abs() < 1e-9);
    assert_eq!(temp.unit, "C");
    assert_eq!(temp.trend, Trend::Stable);
    assert_eq!(outcome.machine.status, MachineStatus::Error);
    assert_eq!(outcome.machine.name, "Secondary Line");
    assert_eq!(outcome.analysis.alarm_level, AlarmLevel::High);

    assert_eq!(outcome.new_alerts.len(), 1);
    let alert = &outcome.new_alerts[0];
    assert_eq!(alert.severity, AlertSeverity::High);
    assert_eq!(alert.category, AlertCategory::Performance);
    assert_eq!(alert.message, "Temperature at critical level (95 C)");

    assert!(machine_rx.has_changed().unwrap());
    let published = machine_rx.borrow_and_update().clone().unwrap();
    assert_eq!(published.id, "MACHINE-003");
    assert_eq!(service.topics().alerts.latest().len(), 1);
}

#[tokio::test]
async fn readings_build_trend_history_and_recover() {
    let (url, _rec) = spawn_backend().await;
    let service = service_with_backend(&url);

    let values = [50.0, 60.0, 85.0, 70.0];
    for (i, v) in values.iter().enumerate() {
        service
            .handle_sensor_data(&sensor_event("M1", &now_rfc3339(i as i64 - 10), &[("sicaklik", *v)]))
            .await;
    }

    let agg = service.read().await;
    let machine = agg.machine("M1").unwrap();
    let temp = &machine.sensors["sicaklik"];
    assert_eq!(temp.value, 70.0);
    assert_eq!(temp.trend, Trend::Down);
    assert_eq!(temp.status, SensorStatus::Normal);
    assert_eq!(machine.status, MachineStatus::Operational);
    assert_eq!(temp.history.len(), 4);

    let view = agg
        .sensor_history("M1", "sicaklik", Utc::now(), TimeRange::OneHour)
        .unwrap();
    let points: Vec<f64> = view.points.iter().map(|p| p.value).collect();
    assert_eq!(points, vec![50.0, 60.0, 85.0, 70.0]);
    assert_eq!(view.stats.count, 4);
    assert!((view.stats.mean - 66.25).abs() < 1e-9);

    // 85 with warning at 80 and danger at 98 scores 5/18: normal, so no alert
    assert!(agg.active_alerts(&AlertFilter::default(), Utc::now()).is_empty());
}

#[tokio::test]
async fn sensors_missing_from_a_payload_keep_their_state() {
    let (url, _rec) = spawn_backend().await;
    let service = service_with_backend(&url);

    service
        .handle_sensor_data(&sensor_event(
            "M1",
            &now_rfc3339(-5),
            &[("sicaklik", 40.0), ("basinc", 1.0)],
        ))
        .await;
    let outcome = service
        .handle_sensor_data(&sensor_event("M1", &now_rfc3339(0), &[("sicaklik", 45.0)]))
        .await;

    assert_eq!(outcome.machine.sensors.len(), 2);
    assert_eq!(outcome.machine.sensors["basinc"].value, 1.0);
    assert_eq!(outcome.machine.sensors["basinc"].history.len(), 1);
    assert_eq!(outcome.machine.sensors["sicaklik"].trend, Trend::Up);
}

#[tokio::test]
async fn unknown_sensor_is_tracked_but_never_alarms() {
    let (url, _rec) = spawn_backend().await;
    let service = service_with_backend(&url);

    let outcome = service
        .handle_sensor_data(&sensor_event("M1", &now_rfc3339(0), &[("nem", 1_000_000.0)]))
        .await;

    let humidity = &outcome.machine.sensors["nem"];
    assert_eq!(humidity.display_name, "nem");
    assert_eq!(humidity.score, 0.0);
    assert_eq!(humidity.status, SensorStatus::Normal);
    assert!(outcome.new_alerts.is_empty());
}

#[tokio::test]
async fn maintenance_override_survives_new_readings() {
    let (url, _rec) = spawn_backend().await;
    let service = service_with_backend(&url);

    service
        .handle_sensor_data(&sensor_event("M1", &now_rfc3339(-2), &[("titresim", 2.0)]))
        .await;
    let machine = service.toggle_maintenance("M1").await.unwrap();
    assert_eq!(machine.status, MachineStatus::Maintenance);

    let outcome = service
        .handle_sensor_data(&sensor_event("M1", &now_rfc3339(0), &[("titresim", 9.0)]))
        .await;
    assert_eq!(outcome.machine.status, MachineStatus::Maintenance);

    let machine = service.toggle_maintenance("M1").await.unwrap();
    assert_eq!(machine.status, MachineStatus::Error);

    assert!(service.toggle_maintenance("M-404").await.is_err());
}

#[tokio::test]
async fn anomaly_alert_is_republished_and_notified() {
    let (url, rec) = spawn_backend().await;
    let service = service_with_backend(&url);
    let mut notifications = service.topics().subscribe_notifications();

    let event = anomaly_event("MACHINE-002", 0.82, "high", &["Vibration at critical level"]);
    service.handle_anomaly_alert(&event).await;

    assert_eq!(service.topics().anomaly.latest(), Some(event));
    let alerts = service.topics().alerts.latest();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].category, AlertCategory::Anomaly);
    assert_eq!(alerts[0].severity, AlertSeverity::High);

    let sent = tokio::time::timeout(Duration::from_secs(2), notifications.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sent.alert_level, "high");
    assert_eq!(sent.messages, vec!["Vibration at critical level"]);

    let bodies = rec.notifications();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["anomaly_score"], 0.9);
    // Stamped with the event's own time, not the send time
    assert_eq!(bodies[0]["timestamp"], "2026-03-01T10:05:00+00:00");
    assert!(!bodies[0]["type_info"]["action"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn acknowledging_calls_backend_then_clears_alert() {
    let (url, rec) = spawn_backend().await;
    let service = service_with_backend(&url);

    let outcome = service
        .handle_sensor_data(&sensor_event("M1", &now_rfc3339(0), &[("gurultu", 115.0)]))
        .await;
    let id = outcome.new_alerts[0].id.clone();

    let acked = service.acknowledge_alert(&id).await.unwrap();
    assert!(acked.acknowledged);
    assert!(service.topics().alerts.latest().is_empty());
    assert!(rec.requests().contains(&format!("POST /alerts/{id}/acknowledge")));

    // Acknowledgment notification carries the alert's own severity
    assert!(eventually(|| !rec.notifications().is_empty()).await);
    assert_eq!(rec.notifications()[0]["alert_level"], acked.severity.as_str());
}

#[tokio::test]
async fn acknowledgment_notification_carries_alert_timestamp() {
    let (url, rec) = spawn_backend().await;
    let service = service_with_backend(&url);

    let outcome = service
        .handle_sensor_data(&sensor_event("M1", "2020-01-01T00:00:00Z", &[("sicaklik", 99.0)]))
        .await;
    let id = outcome.new_alerts[0].id.clone();
    service.acknowledge_alert(&id).await.unwrap();

    assert!(eventually(|| !rec.notifications().is_empty()).await);
    assert_eq!(rec.notifications()[0]["timestamp"], "2020-01-01T00:00:00+00:00");
}

#[tokio::test]
async fn failed_notification_is_logged_and_leaves_state_alone() {
    let url = unreachable_backend().await;
    let service = service_with_backend(&url);
    let mut notifications = service.topics().subscribe_notifications();

    service
        .handle_anomaly_alert(&anomaly_event("M4", 0.9, "high", &["Pressure at critical level"]))
        .await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(service.topics().alerts.latest().len(), 1);
    {
        let agg = service.read().await;
        assert_eq!(agg.active_alerts(&AlertFilter::default(), Utc::now()).len(), 1);
    }
    assert!(notifications.try_recv().is_err());

    // Same failure seen directly through the notifier task
    let (tx, mut rx) = broadcast::channel(4);
    let config = NotificationConfig {
        enabled: true,
        recipients: vec!["ops@example.com".to_string()],
    };
    let notifier = Notifier::new(BackendClient::new(&url).unwrap(), &config, tx);
    let task = notifier
        .notify(AlertSeverity::High, vec!["x".to_string()], Utc::now())
        .unwrap();
    task.await.unwrap();
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn disabled_notifications_send_nothing() {
    let (url, rec) = spawn_backend().await;
    let mut config = MonitorConfig::default();
    config.backend.base_url = url.clone();
    config.notifications.enabled = false;
    let backend = BackendClient::new(&url).unwrap();
    let service = DashboardService::new(&config, backend.clone());

    let (tx, _rx) = broadcast::channel(4);
    let notifier = Notifier::new(backend, &config.notifications, tx);
    assert!(notifier
        .notify(AlertSeverity::High, vec!["x".to_string()], Utc::now())
        .is_none());

    service
        .handle_anomaly_alert(&anomaly_event("M5", 0.8, "high", &["Noise at critical level"]))
        .await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(service.topics().alerts.latest().len(), 1);
    assert!(rec.notifications().is_empty());
    assert!(rec.requests().is_empty());
}

#[tokio::test]
async fn refresh_timer_requests_readings_on_interval() {
    let (url, rec) = spawn_backend().await;
    let service = service_with_backend(&url);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run_refresh_timer(service, Duration::from_millis(50), cancel.clone()));

    let refreshes = |rec: &common::Recorded| {
        rec.requests().iter().filter(|r| *r == "POST /test/sensor-data").count()
    };
    assert!(eventually(|| refreshes(&rec) >= 2).await);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
}

#[tokio::test]
async fn refresh_timer_survives_backend_failures() {
    let url = unreachable_backend().await;
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run_refresh_timer(
        service_with_backend(&url),
        Duration::from_millis(30),
        cancel.clone(),
    ));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!task.is_finished());

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
}

#[tokio::test]
async fn processing_loop_replays_stdin_lines_to_end() {
    let (url, _rec) = spawn_backend().await;
    let service = service_with_backend(&url);

    let ts = now_rfc3339(0);
    let lines = [
        format!(
            r#"{{"type":1,"target":"ReceiveSensorData","arguments":[{{"machineId":"M7","timestamp":"{ts}","sensors":{{"basinc":{{"value":1.5,"unit":"bar"}}}}}}]}}"#
        ),
        r#"{"type":1,"target":"SomethingElse","arguments":[{}]}"#.to_string(),
        r#"{"machineId":"M7","isAnomaly":true,"score":0.55,"alarmLevel":"medium","messages":["Pressure outside normal range"]}"#.to_string(),
    ];

    let mut events = VecDeque::new();
    for line in &lines {
        if let Some(ev) = parse_event_line(line, "ReceiveSensorData", "ReceiveAnomalyAlert").unwrap() {
            events.push_back(ev);
        }
    }
    assert_eq!(events.len(), 2);

    let stats = ProcessingLoop::new(service.clone(), CancellationToken::new())
        .run(&mut ScriptedSource { events })
        .await;
    assert_eq!(stats.sensor_events, 1);
    assert_eq!(stats.anomaly_events, 1);
    // Pressure 1.5: range 0.8..1.2, warning 1.2, danger 1.32 -> danger
    assert_eq!(stats.alerts_raised, 1);

    let agg = service.read().await;
    assert_eq!(agg.machine_status("M7"), Some(MachineStatus::Error));
    assert_eq!(agg.active_alerts(&AlertFilter::default(), Utc::now()).len(), 2);
    assert_eq!(agg.stats().anomaly_events, 1);
}

#[tokio::test]
async fn processing_loop_stops_on_cancel() {
    struct Idle;

    #[async_trait]
    impl EventSource for Idle {
        async fn next_event(&mut self) -> anyhow::Result<HubEvent> {
            std::future::pending().await
        }

        fn source_name(&self) -> &str {
            "idle"
        }
    }

    let (url, _rec) = spawn_backend().await;
    let cancel = CancellationToken::new();
    let processing_loop = ProcessingLoop::new(service_with_backend(&url), cancel.clone());
    let task = tokio::spawn(async move { processing_loop.run(&mut Idle).await });
    cancel.cancel();
    let stats = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stats.sensor_events, 0);
}
