//! Push hub client with fixed-delay reconnection
//!
//! State machine: `Disconnected -> Connecting -> Connected`. A failed
//! connect or handshake returns to `Disconnected` and retries after the
//! fixed delay, forever. A connection lost while `Connected` returns to
//! `Disconnected` and reconnects at once; if that attempt fails the fixed
//! delay applies again.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::protocol::{self, FrameDecoder, HubMessage};
use super::registry::{HandlerRegistry, Subscription};
use super::HubError;
use crate::config::HubConfig;

const READ_CHUNK: usize = 8192;

// ============================================================================
// Connection State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Connection counters, readable while the client runs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HubStats {
    pub attempts: u64,
    pub connections: u64,
    pub disconnects: u64,
    pub events_received: u64,
    pub events_unhandled: u64,
}

// ============================================================================
// Transport
// ============================================================================

/// Byte stream the protocol runs over.
pub trait HubStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> HubStream for T {}

/// Opens a fresh transport for every connection attempt.
#[async_trait]
pub trait HubConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn HubStream>, HubError>;

    /// Endpoint description for logs.
    fn endpoint(&self) -> String;
}

/// Plain TCP transport with OS keepalive enabled.
pub struct TcpConnector {
    addr: String,
}

impl TcpConnector {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl HubConnector for TcpConnector {
    async fn connect(&self) -> Result<Box<dyn HubStream>, HubError> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| HubError::Connect(format!("{}: {e}", self.addr)))?;

        // Detect dead peers even when the hub goes quiet
        let sock_ref = socket2::SockRef::from(&stream);
        let keepalive = socket2::TcpKeepalive::new()
            .with_time(Duration::from_secs(30))
            .with_interval(Duration::from_secs(10));
        if let Err(e) = sock_ref.set_tcp_keepalive(&keepalive) {
            debug!(error = %e, "Could not enable TCP keepalive");
        }
        let _ = stream.set_nodelay(true);

        Ok(Box::new(stream))
    }

    fn endpoint(&self) -> String {
        self.addr.clone()
    }
}

// ============================================================================
// Client
// ============================================================================

#[derive(Debug, Clone)]
pub struct HubClientSettings {
    pub retry_delay: Duration,
    pub keep_alive: Duration,
    pub server_timeout: Duration,
    pub handshake_timeout: Duration,
}

impl From<&HubConfig> for HubClientSettings {
    fn from(c: &HubConfig) -> Self {
        Self {
            retry_delay: c.retry_delay(),
            keep_alive: Duration::from_secs(c.keep_alive_secs),
            server_timeout: Duration::from_secs(c.server_timeout_secs),
            handshake_timeout: Duration::from_secs(c.handshake_timeout_secs),
        }
    }
}

impl Default for HubClientSettings {
    fn default() -> Self {
        Self::from(&HubConfig::default())
    }
}

struct Session {
    reader: ReadHalf<Box<dyn HubStream>>,
    writer: WriteHalf<Box<dyn HubStream>>,
    decoder: FrameDecoder,
}

enum SessionEnd {
    Cancelled,
    Lost(String),
}

/// Process-lifetime hub connection.
///
/// Cloning shares the same connection state and handler registry. Register
/// handlers with [`HubClient::on`] before calling [`HubClient::run`] so no
/// event is missed.
#[derive(Clone)]
pub struct HubClient {
    connector: Arc<dyn HubConnector>,
    settings: HubClientSettings,
    registry: HandlerRegistry,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    transitions_tx: broadcast::Sender<ConnectionState>,
    stats: Arc<Mutex<HubStats>>,
}

impl HubClient {
    pub fn new(connector: Arc<dyn HubConnector>, settings: HubClientSettings) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (transitions_tx, _) = broadcast::channel(64);
        Self {
            connector,
            settings,
            registry: HandlerRegistry::new(),
            state_tx: Arc::new(state_tx),
            transitions_tx,
            stats: Arc::new(Mutex::new(HubStats::default())),
        }
    }

    pub fn tcp(config: &HubConfig) -> Self {
        Self::new(Arc::new(TcpConnector::new(config.addr.clone())), HubClientSettings::from(config))
    }

    /// Typed subscription to a hub event.
    pub fn on<T: DeserializeOwned>(&self, event: &str) -> Subscription<T> {
        self.registry.subscribe(event)
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Latest-value view of the connection state.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Every state transition, in order.
    pub fn transitions(&self) -> broadcast::Receiver<ConnectionState> {
        self.transitions_tx.subscribe()
    }

    pub fn stats(&self) -> HubStats {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
        let _ = self.transitions_tx.send(state);
    }

    fn bump(&self, f: impl FnOnce(&mut HubStats)) {
        f(&mut self.stats.lock().unwrap_or_else(|e| e.into_inner()));
    }

    /// Connect and keep reconnecting until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) -> HubStats {
        let endpoint = self.connector.endpoint();
        info!(endpoint = %endpoint, "[HubClient] Starting");
        let mut delay = Duration::ZERO;

        loop {
            if !delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            if cancel.is_cancelled() {
                break;
            }

            self.set_state(ConnectionState::Connecting);
            self.bump(|s| s.attempts += 1);

            let opened = tokio::select! {
                _ = cancel.cancelled() => {
                    self.set_state(ConnectionState::Disconnected);
                    break;
                }
                r = tokio::time::timeout(self.settings.handshake_timeout, self.open()) => {
                    r.unwrap_or(Err(HubError::Timeout))
                }
            };

            let session = match opened {
                Ok(session) => session,
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, retry_in = ?self.settings.retry_delay,
                        "[HubClient] Connection attempt failed");
                    self.set_state(ConnectionState::Disconnected);
                    delay = self.settings.retry_delay;
                    continue;
                }
            };

            self.set_state(ConnectionState::Connected);
            self.bump(|s| s.connections += 1);
            info!(endpoint = %endpoint, "[HubClient] Connected");

            let end = self.pump(session, &cancel).await;
            self.set_state(ConnectionState::Disconnected);
            match end {
                SessionEnd::Cancelled => break,
                SessionEnd::Lost(reason) => {
                    self.bump(|s| s.disconnects += 1);
                    warn!(endpoint = %endpoint, reason = %reason, "[HubClient] Connection lost, reconnecting");
                    delay = Duration::ZERO;
                }
            }
        }

        info!("[HubClient] Stopped");
        self.stats()
    }

    /// Open the transport and complete the handshake.
    async fn open(&self) -> Result<Session, HubError> {
        let stream = self.connector.connect().await?;
        let (mut reader, mut writer) = tokio::io::split(stream);

        writer.write_all(&protocol::handshake_request()).await?;
        writer.flush().await?;

        let mut decoder = FrameDecoder::new();
        let mut chunk = vec![0u8; READ_CHUNK];
        let response = loop {
            if let Some(record) = decoder.next_record() {
                break record;
            }
            let n = reader.read(&mut chunk).await?;
            if n == 0 {
                return Err(HubError::Closed("closed during handshake".to_string()));
            }
            decoder.extend(&chunk[..n]);
        };
        protocol::parse_handshake_response(&response)?;

        Ok(Session {
            reader,
            writer,
            decoder,
        })
    }

    async fn pump(&self, mut session: Session, cancel: &CancellationToken) -> SessionEnd {
        let keep_alive = self.settings.keep_alive;
        let mut ping = tokio::time::interval_at(Instant::now() + keep_alive, keep_alive);
        let mut last_heard = Instant::now();
        let mut chunk = vec![0u8; READ_CHUNK];

        loop {
            // Records that arrived alongside earlier reads
            while let Some(record) = session.decoder.next_record() {
                if let Some(end) = self.handle_record(&record) {
                    return end;
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    let close = HubMessage::Close { error: None }.encode();
                    let _ = session.writer.write_all(&close).await;
                    return SessionEnd::Cancelled;
                }
                _ = ping.tick() => {
                    if let Err(e) = session.writer.write_all(&HubMessage::Ping.encode()).await {
                        return SessionEnd::Lost(format!("ping failed: {e}"));
                    }
                }
                _ = tokio::time::sleep_until(last_heard + self.settings.server_timeout) => {
                    return SessionEnd::Lost(format!(
                        "no message from hub in {:?}", self.settings.server_timeout
                    ));
                }
                read = session.reader.read(&mut chunk) => match read {
                    Ok(0) => return SessionEnd::Lost("connection closed by hub".to_string()),
                    Ok(n) => {
                        last_heard = Instant::now();
                        session.decoder.extend(&chunk[..n]);
                    }
                    Err(e) => return SessionEnd::Lost(format!("read failed: {e}")),
                },
            }
        }
    }

    /// Returns `Some` when the record ends the session.
    fn handle_record(&self, record: &[u8]) -> Option<SessionEnd> {
        let message = match HubMessage::parse(record) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "[HubClient] Skipping malformed record");
                return None;
            }
        };

        match message {
            HubMessage::Invocation {
                target, arguments, ..
            } => {
                let payload = arguments.into_iter().next().unwrap_or_default();
                let delivered = self.registry.dispatch(&target, &payload);
                self.bump(|s| {
                    s.events_received += 1;
                    if delivered == 0 {
                        s.events_unhandled += 1;
                    }
                });
                if delivered == 0 {
                    debug!(target = %target, "[HubClient] No handler for event");
                }
                None
            }
            HubMessage::Ping => None,
            HubMessage::Close { error } => Some(SessionEnd::Lost(
                error.unwrap_or_else(|| "hub closed the connection".to_string()),
            )),
            HubMessage::Other(t) => {
                debug!(message_type = t, "[HubClient] Ignoring message");
                None
            }
        }
    }
}
