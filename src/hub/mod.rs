//! Push hub connection
//!
//! ## Modules
//!
//! - `protocol` - JSON record framing, handshake and message types
//! - `registry` - typed event subscriptions with disposable handles
//! - `client`   - connection state machine with fixed-delay reconnect

pub mod client;
pub mod protocol;
pub mod registry;

pub use client::{
    ConnectionState, HubClient, HubClientSettings, HubConnector, HubStats, HubStream, TcpConnector,
};
pub use protocol::HubMessage;
pub use registry::{HandlerRegistry, Subscription};

use thiserror::Error;

/// Hub connection and protocol errors
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Timed out connecting to hub")]
    Timeout,

    #[error("Handshake rejected: {0}")]
    Handshake(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection closed: {0}")]
    Closed(String),
}
