//! Transport capability consumed by the connection manager

use super::types::{ConnectTarget, ReadyState, TransportEvent, WsError};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Write half of an open transport
pub trait TransportSink: Send + Sync {
    /// Current send readiness
    fn ready_state(&self) -> ReadyState;

    /// Send one text frame; fire-and-forget once accepted
    fn send(&self, text: String) -> Result<(), WsError>;

    /// Request the transport to close; a `Close` event follows
    fn close(&self);
}

/// A transport that has been asked to connect
pub struct TransportLink {
    pub sink: Arc<dyn TransportSink>,
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Opens transports towards a target.
///
/// `open` must not block: the handshake runs in the background and its
/// outcome is reported through the returned event channel (`Open`, or
/// `Error` followed by `Close`).
pub trait Transport: Send + Sync {
    fn open(&self, target: &ConnectTarget) -> TransportLink;
}
