//! Production Line Hub Simulation
//!
//! Generates sensor readings for one machine and pushes them to connected
//! LineWatch clients over the JSON hub protocol. Readings follow a normal
//! distribution around each sensor's range midpoint; with the configured
//! probability one sensor is pushed above its range and an anomaly alert
//! follows the reading.
//!
//! # Usage
//! ```bash
//! # Serve as a hub on 127.0.0.1:5006
//! ./simulation --interval-ms 500 --anomaly-probability 0.1
//!
//! # Print invocation records as JSON lines instead
//! ./simulation --stdout --count 200 | ./linewatch --stdin
//! ```

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use rand::prelude::*;
use rand_distr::{Distribution, Normal, Uniform};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::io::Write;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use linewatch::config::{defaults, ThresholdConfig};
use linewatch::hub::protocol::{self, encode_record, FrameDecoder, HubMessage};
use linewatch::processing::analysis::{alarm_level, total_score};
use linewatch::processing::{deviation_score, thresholds_for};
use linewatch::types::{AnomalyAlertEvent, SensorDataEvent, SensorKind, SensorValue};

/// Spread of normal readings as a fraction of the range width
const NORMAL_SPREAD: f64 = 0.12;
/// Hub-side ping period
const PING_INTERVAL: Duration = Duration::from_secs(15);

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "simulation")]
#[command(about = "Push hub simulation for LineWatch testing")]
#[command(version)]
struct Args {
    /// Address to accept hub clients on
    #[arg(long, default_value = defaults::HUB_ADDR)]
    addr: String,

    /// Milliseconds between sensor readings
    #[arg(short, long, default_value = "1000", value_parser = clap::value_parser!(u64).range(10..=600_000))]
    interval_ms: u64,

    /// Machine id carried on every event
    #[arg(short, long, default_value = defaults::DEFAULT_MACHINE_ID)]
    machine: String,

    /// Probability that a reading carries an out-of-range sensor
    #[arg(long, default_value = "0.05")]
    anomaly_probability: f64,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Write invocation records to stdout as JSON lines instead of serving
    #[arg(long)]
    stdout: bool,

    /// Stop after this many readings (default: run until Ctrl+C)
    #[arg(long)]
    count: Option<u64>,
}

// ============================================================================
// Reading Generator
// ============================================================================

struct Simulator {
    rng: StdRng,
    machine_id: String,
    anomaly_probability: f64,
    thresholds: ThresholdConfig,
    readings: u64,
    anomalies: u64,
}

/// One tick of output: a reading and, when injected, its anomaly alert.
struct Tick {
    reading: SensorDataEvent,
    anomaly: Option<AnomalyAlertEvent>,
}

impl Simulator {
    fn new(args: &Args) -> Self {
        let rng = match args.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            machine_id: args.machine.clone(),
            anomaly_probability: if args.anomaly_probability.is_finite() {
                args.anomaly_probability.clamp(0.0, 1.0)
            } else {
                0.0
            },
            thresholds: ThresholdConfig::default(),
            readings: 0,
            anomalies: 0,
        }
    }

    fn normal_value(&mut self, kind: SensorKind) -> f64 {
        let range = kind.normal_range();
        let sigma = (range.width() * NORMAL_SPREAD).max(f64::EPSILON);
        let value = Normal::new(range.midpoint(), sigma)
            .map_or(range.midpoint(), |dist| dist.sample(&mut self.rng));
        value.clamp(range.min, range.max)
    }

    /// Push a value above the normal range by 10% to 60% of its width.
    fn excursion_value(&mut self, kind: SensorKind) -> f64 {
        let range = kind.normal_range();
        let over = Uniform::new(0.1, 0.6).sample(&mut self.rng);
        range.max + range.width() * over
    }

    fn tick(&mut self) -> Tick {
        self.readings += 1;
        let now = Utc::now().to_rfc3339();

        let spike = if self.rng.gen_bool(self.anomaly_probability) {
            SensorKind::ALL.choose(&mut self.rng).copied()
        } else {
            None
        };

        let sensors: BTreeMap<String, SensorValue> = SensorKind::ALL
            .iter()
            .map(|&kind| {
                let value = if spike == Some(kind) {
                    self.excursion_value(kind)
                } else {
                    self.normal_value(kind)
                };
                (
                    kind.key().to_string(),
                    SensorValue {
                        value: (value * 100.0).round() / 100.0,
                        unit: kind.unit().to_string(),
                    },
                )
            })
            .collect();

        let reading = SensorDataEvent {
            machine_id: self.machine_id.clone(),
            timestamp: now.clone(),
            sensors,
        };

        let anomaly = spike.map(|kind| {
            self.anomalies += 1;
            let scores: Vec<f64> = reading
                .sensors
                .iter()
                .map(|(key, v)| deviation_score(v.value, thresholds_for(key, &self.thresholds)))
                .collect();
            let score = total_score(&scores);
            AnomalyAlertEvent {
                machine_id: self.machine_id.clone(),
                timestamp: now,
                is_anomaly: true,
                score,
                alarm_level: alarm_level(score).as_str().to_string(),
                messages: vec![format!("{} outside normal range", kind.display_name())],
                sensor_data: reading.sensors.clone(),
            }
        });

        Tick { reading, anomaly }
    }
}

fn invocation(target: &str, payload: &impl serde::Serialize) -> Result<Value> {
    let payload = serde_json::to_value(payload)?;
    Ok(HubMessage::invocation(target, payload).to_value())
}

fn tick_records(tick: &Tick) -> Result<Vec<Value>> {
    let mut records = vec![invocation(defaults::SENSOR_DATA_EVENT, &tick.reading)?];
    if let Some(alert) = &tick.anomaly {
        records.push(invocation(defaults::ANOMALY_ALERT_EVENT, alert)?);
    }
    Ok(records)
}

// ============================================================================
// Stdout Mode
// ============================================================================

async fn run_stdout(args: &Args, mut sim: Simulator) -> Result<()> {
    let mut ticker = tokio::time::interval(Duration::from_millis(args.interval_ms));
    let stdout = std::io::stdout();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {}
        }

        let tick = sim.tick();
        let mut lock = stdout.lock();
        for record in tick_records(&tick)? {
            writeln!(lock, "{record}")?;
        }
        lock.flush()?;

        if args.count.is_some_and(|n| sim.readings >= n) {
            break;
        }
    }

    info!(readings = sim.readings, anomalies = sim.anomalies, "Simulation complete");
    Ok(())
}

// ============================================================================
// Hub Mode
// ============================================================================

/// Complete the server side of the handshake. The returned decoder holds
/// any bytes that arrived after the handshake record.
async fn accept_handshake(stream: &mut TcpStream) -> Result<FrameDecoder> {
    let mut decoder = FrameDecoder::new();
    let mut chunk = [0u8; 1024];
    let request = loop {
        if let Some(record) = decoder.next_record() {
            break record;
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            anyhow::bail!("client closed during handshake");
        }
        decoder.extend(&chunk[..n]);
    };

    let answer = match protocol::parse_handshake_request(&request) {
        Ok((name, version)) if name == protocol::PROTOCOL_NAME && version == protocol::PROTOCOL_VERSION => {
            json!({})
        }
        Ok((name, version)) => json!({ "error": format!("unsupported protocol '{name}' v{version}") }),
        Err(e) => json!({ "error": e.to_string() }),
    };
    let rejected = answer.get("error").is_some();
    stream.write_all(&encode_record(&answer)).await?;
    if rejected {
        anyhow::bail!("handshake rejected: {answer}");
    }
    Ok(decoder)
}

async fn serve_client(mut stream: TcpStream, peer: SocketAddr, mut records: broadcast::Receiver<Vec<u8>>) -> Result<()> {
    let mut decoder = accept_handshake(&mut stream).await?;
    info!(%peer, "Client connected");

    let mut ping = tokio::time::interval_at(tokio::time::Instant::now() + PING_INTERVAL, PING_INTERVAL);
    let mut chunk = [0u8; 1024];

    loop {
        while let Some(record) = decoder.next_record() {
            match HubMessage::parse(&record) {
                Ok(HubMessage::Close { .. }) => {
                    info!(%peer, "Client closed the connection");
                    return Ok(());
                }
                Ok(msg) => debug!(%peer, ?msg, "Client record"),
                Err(e) => warn!(%peer, error = %e, "Malformed client record"),
            }
        }

        tokio::select! {
            n = stream.read(&mut chunk) => {
                let n = n?;
                if n == 0 {
                    info!(%peer, "Client disconnected");
                    return Ok(());
                }
                decoder.extend(&chunk[..n]);
            }
            record = records.recv() => match record {
                Ok(bytes) => stream.write_all(&bytes).await?,
                Err(broadcast::error::RecvError::Lagged(n)) => warn!(%peer, skipped = n, "Client lagging"),
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            },
            _ = ping.tick() => stream.write_all(&HubMessage::Ping.encode()).await?,
        }
    }
}

async fn run_hub(args: &Args, mut sim: Simulator) -> Result<()> {
    let listener = TcpListener::bind(&args.addr)
        .await
        .with_context(|| format!("Failed to bind hub on {}", args.addr))?;
    info!(addr = %args.addr, machine = %sim.machine_id, "Hub simulation listening");

    let (records_tx, _) = broadcast::channel::<Vec<u8>>(256);
    let mut ticker = tokio::time::interval(Duration::from_millis(args.interval_ms));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                let rx = records_tx.subscribe();
                tokio::spawn(async move {
                    if let Err(e) = serve_client(stream, peer, rx).await {
                        warn!(%peer, error = %e, "Client session ended with error");
                    }
                });
            }
            _ = ticker.tick() => {
                let tick = sim.tick();
                if let Some(alert) = &tick.anomaly {
                    info!(score = alert.score, level = %alert.alarm_level, "Injected anomaly");
                }
                for record in tick_records(&tick)? {
                    // No receivers just means no client is connected
                    let _ = records_tx.send(encode_record(&record));
                }
                if args.count.is_some_and(|n| sim.readings >= n) {
                    break;
                }
            }
        }
    }

    info!(readings = sim.readings, anomalies = sim.anomalies, "Simulation complete");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays clean for --stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let sim = Simulator::new(&args);

    if args.stdout {
        run_stdout(&args, sim).await
    } else {
        run_hub(&args, sim).await
    }
}
