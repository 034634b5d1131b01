//! WebSocket types and configuration

use std::time::Duration;
use thiserror::Error;

/// Transport configuration for the tungstenite-backed socket
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Interval for sending ping frames
    pub ping_interval: Duration,
    /// Capacity of the per-connection event channel
    pub event_buffer: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            event_buffer: 1024,
        }
    }
}

impl TransportConfig {
    /// Set ping interval
    pub fn ping_interval(mut self, d: Duration) -> Self {
        self.ping_interval = d;
        self
    }

    /// Set event channel capacity
    pub fn event_buffer(mut self, n: usize) -> Self {
        self.event_buffer = n;
        self
    }
}

/// Effective handshake target: the URL after credential injection plus headers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    /// Effective URL, also used as the connection key
    pub url: String,
    /// Extra handshake headers (`Authorization`, `Cookie`, ...)
    pub headers: Vec<(String, String)>,
    /// Requested subprotocols
    pub subprotocols: Vec<String>,
}

impl ConnectTarget {
    /// Target with no extra headers
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            subprotocols: Vec::new(),
        }
    }

    /// Look up a header by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Send readiness of a transport, mirroring the browser `readyState` values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl From<u8> for ReadyState {
    fn from(v: u8) -> Self {
        match v {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }
}

/// Events emitted by a transport, in order, on its event channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake completed
    Open,
    /// Text frame (binary frames are delivered lossily decoded)
    Message(String),
    /// Transport-level failure; a `Close` is expected to follow
    Error(String),
    /// Connection closed; always the last event
    Close { code: u16, reason: String },
}

/// WebSocket manager errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WsError {
    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    /// No open, ready connection under the key
    #[error("Not connected: {0}")]
    NotConnected(String),
    /// Send failed
    #[error("Send failed: {0}")]
    SendFailed(String),
    /// Error reported by the transport
    #[error("Transport error: {0}")]
    Transport(String),
    /// A middleware rejected an inbound message
    #[error("Middleware failed: {0}")]
    Middleware(String),
    /// Unknown per-connection event name
    #[error("Unknown event: {0}")]
    UnknownEvent(String),
    /// Payload could not be encoded
    #[error("Serialization failed: {0}")]
    Serialization(String),
    /// Connect attempt aborted by an explicit close
    #[error("Connect cancelled: {0}")]
    Cancelled(String),
    /// Broadcast server failure
    #[error("Server error: {0}")]
    Server(String),
}
