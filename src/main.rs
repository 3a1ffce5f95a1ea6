//! LineWatch - production line sensor monitor
//!
//! Subscribes to sensor and anomaly events on the push hub, keeps per-machine
//! state and serves dashboard views over HTTP.
//!
//! # Usage
//!
//! ```bash
//! # Connect to the hub from linewatch.toml (or defaults)
//! cargo run --release
//!
//! # Against the bundled simulator
//! cargo run --bin simulation &
//! cargo run --release -- --hub 127.0.0.1:5006
//!
//! # Replay JSON events from stdin
//! cargo run --bin simulation -- --stdout | ./linewatch --stdin
//! ```
//!
//! # Environment Variables
//!
//! - `LINEWATCH_CONFIG`: Path to the TOML config file
//! - `LINEWATCH_CORS_ORIGINS`: Comma-separated origins allowed by CORS
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use linewatch::api::{create_app, DashboardState};
use linewatch::backend::BackendClient;
use linewatch::config::MonitorConfig;
use linewatch::hub::HubClient;
use linewatch::pipeline::source::{EventSource, HubSource, StdinSource};
use linewatch::pipeline::{run_refresh_timer, DashboardService, ProcessingLoop};
use linewatch::types::{AnomalyAlertEvent, SensorDataEvent};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "linewatch")]
#[command(about = "LineWatch production line sensor monitor")]
#[command(version)]
struct CliArgs {
    /// Path to a TOML config file (overrides LINEWATCH_CONFIG and ./linewatch.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the hub address from config
    #[arg(long, value_name = "HOST:PORT")]
    hub: Option<String>,

    /// Override the HTTP server address (default: "0.0.0.0:8080")
    #[arg(short, long)]
    addr: Option<String>,

    /// Read hub events from stdin (JSON lines) instead of connecting to the hub
    /// Use with simulator: simulation --stdout | ./linewatch --stdin
    #[arg(long)]
    stdin: bool,

    /// Disable the periodic refresh request to the backend
    #[arg(long)]
    no_refresh: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

// ============================================================================
// Supervisor
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    HttpServer,
    HubClient,
    EventProcessor,
    RefreshTimer,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::HttpServer => write!(f, "HttpServer"),
            TaskName::HubClient => write!(f, "HubClient"),
            TaskName::EventProcessor => write!(f, "EventProcessor"),
            TaskName::RefreshTimer => write!(f, "RefreshTimer"),
        }
    }
}

/// Spawn the HTTP server task into the JoinSet.
fn spawn_http_server(
    task_set: &mut JoinSet<Result<TaskName>>,
    listener: tokio::net::TcpListener,
    app: axum::Router,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[HttpServer] Task starting");

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("[HttpServer] Received shutdown signal");
            })
            .await;

        match result {
            Ok(()) => {
                info!("[HttpServer] Graceful shutdown complete");
                Ok(TaskName::HttpServer)
            }
            Err(e) => {
                error!("[HttpServer] Server error: {}", e);
                Err(anyhow::anyhow!("HTTP server error: {}", e))
            }
        }
    });
}

/// Spawn the event processor over any source.
fn spawn_event_processor<S: EventSource>(
    task_set: &mut JoinSet<Result<TaskName>>,
    mut source: S,
    service: DashboardService,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[EventProcessor] Task starting");
        let processing_loop = ProcessingLoop::new(service, cancel_token);
        let _stats = processing_loop.run(&mut source).await;
        Ok(TaskName::EventProcessor)
    });
}

async fn run_supervisor(task_set: &mut JoinSet<Result<TaskName>>, cancel_token: CancellationToken) -> Result<()> {
    info!("Supervisor: All tasks spawned, monitoring...");

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("Supervisor: Shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!("Supervisor: Task {} completed normally", task_name);
                    }
                    Some(Ok(Err(e))) => {
                        error!("Supervisor: Task failed with error: {}", e);
                        cancel_token.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!("Supervisor: Task panicked: {}", e);
                        cancel_token.cancel();
                        return Err(anyhow::anyhow!("Task panicked: {}", e));
                    }
                    None => {
                        info!("Supervisor: All tasks completed");
                        break;
                    }
                }
            }
        }
    }

    // Let tasks observe the token and finish their own shutdown
    let drain = async {
        while let Some(result) = task_set.join_next().await {
            if let Ok(Ok(task_name)) = result {
                info!("Supervisor: Task {} stopped", task_name);
            }
        }
    };
    if tokio::time::timeout(std::time::Duration::from_secs(5), drain).await.is_err() {
        warn!("Supervisor: Tasks did not stop within 5s, aborting");
        task_set.abort_all();
    }

    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
    }
}

fn load_config(args: &CliArgs) -> Result<MonitorConfig> {
    let mut config = match &args.config {
        Some(path) => MonitorConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => MonitorConfig::load(),
    };
    if let Some(hub) = &args.hub {
        config.hub.addr = hub.clone();
    }
    if let Some(addr) = &args.addr {
        config.server.addr = addr.clone();
    }
    if args.no_refresh {
        config.refresh.enabled = false;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(args.log_json);

    let config = load_config(&args)?;

    info!("LineWatch - production line sensor monitor");
    info!(
        hub = %config.hub.addr,
        backend = %config.backend.base_url,
        server = %config.server.addr,
        "Configuration loaded"
    );

    let backend = BackendClient::new(&config.backend.base_url).context("Failed to build backend client")?;
    let service = DashboardService::new(&config, backend);

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();

    // Event input: hub subscriptions are registered before the client runs
    let hub = if args.stdin {
        info!("Input: stdin (JSON hub events)");
        spawn_event_processor(&mut task_set, StdinSource::new(&config.hub), service.clone(), cancel_token.clone());
        None
    } else {
        info!("Input: hub at {}", config.hub.addr);
        let client = HubClient::tcp(&config.hub);
        let source = HubSource::new(
            client.on::<SensorDataEvent>(&config.hub.sensor_event),
            client.on::<AnomalyAlertEvent>(&config.hub.anomaly_event),
        );
        spawn_event_processor(&mut task_set, source, service.clone(), cancel_token.clone());

        let hub_client = client.clone();
        let hub_cancel = cancel_token.clone();
        task_set.spawn(async move {
            info!("[HubClient] Task starting");
            let stats = hub_client.run(hub_cancel).await;
            info!(
                connections = stats.connections,
                events = stats.events_received,
                "[HubClient] Task finished"
            );
            Ok(TaskName::HubClient)
        });
        Some(client)
    };

    if config.refresh.enabled {
        let refresh_service = service.clone();
        let interval = std::time::Duration::from_secs(config.refresh.interval_secs);
        let refresh_cancel = cancel_token.clone();
        task_set.spawn(async move {
            run_refresh_timer(refresh_service, interval, refresh_cancel).await;
            Ok(TaskName::RefreshTimer)
        });
    }

    let listener = tokio::net::TcpListener::bind(&config.server.addr)
        .await
        .with_context(|| format!("Failed to bind HTTP server to {}", config.server.addr))?;
    info!("Dashboard API listening on http://{}/api/v1", config.server.addr);
    let app = create_app(DashboardState::new(service, hub));
    spawn_http_server(&mut task_set, listener, app, cancel_token.clone());

    run_supervisor(&mut task_set, cancel_token).await?;

    info!("LineWatch shutdown complete");
    Ok(())
}
