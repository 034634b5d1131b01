//! WebSocket transport layer
//!
//! Defines the transport capability the manager drives and a default
//! implementation on top of tokio-tungstenite with ping/pong keepalive.

mod client;
mod transport;
mod types;

pub use client::TungsteniteTransport;
pub use transport::{Transport, TransportLink, TransportSink};
pub use types::{ConnectTarget, ReadyState, TransportConfig, TransportEvent, WsError};
