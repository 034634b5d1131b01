//! tokio-tungstenite transport with ping keepalive

use super::transport::{Transport, TransportLink, TransportSink};
use super::types::{ConnectTarget, ReadyState, TransportConfig, TransportEvent, WsError};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Abnormal closure, used when the stream ends without a close frame
const CLOSE_ABNORMAL: u16 = 1006;
const CLOSE_NORMAL: u16 = 1000;

enum Outbound {
    Text(String),
    Close,
}

struct TungsteniteSink {
    state: Arc<AtomicU8>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl TransportSink for TungsteniteSink {
    fn ready_state(&self) -> ReadyState {
        ReadyState::from(self.state.load(Ordering::Acquire))
    }

    fn send(&self, text: String) -> Result<(), WsError> {
        if self.ready_state() != ReadyState::Open {
            return Err(WsError::NotConnected("socket is not open".into()));
        }
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|_| WsError::SendFailed("socket task has stopped".into()))
    }

    fn close(&self) {
        let _ = self.state.compare_exchange(
            ReadyState::Open as u8,
            ReadyState::Closing as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        let _ = self.state.compare_exchange(
            ReadyState::Connecting as u8,
            ReadyState::Closing as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        let _ = self.outbound.send(Outbound::Close);
    }
}

/// Transport backed by `tokio_tungstenite::connect_async`
#[derive(Debug, Clone, Default)]
pub struct TungsteniteTransport {
    config: TransportConfig,
}

impl TungsteniteTransport {
    /// Create a transport with the given configuration
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    /// Run one socket until it closes, then emit the terminal `Close` event
    async fn run(
        target: ConnectTarget,
        config: TransportConfig,
        state: Arc<AtomicU8>,
        events: mpsc::Sender<TransportEvent>,
        mut outbound: mpsc::UnboundedReceiver<Outbound>,
    ) {
        let (code, reason) =
            match Self::connect_and_stream(&target, &config, &state, &events, &mut outbound).await
            {
                Ok(closed) => closed,
                Err(e) => {
                    tracing::warn!(url = %target.url, error = %e, "WebSocket transport failed");
                    let _ = events.send(TransportEvent::Error(e.to_string())).await;
                    (CLOSE_ABNORMAL, e.to_string())
                }
            };

        state.store(ReadyState::Closed as u8, Ordering::Release);
        let _ = events.send(TransportEvent::Close { code, reason }).await;
    }

    /// Connect to the target and pump frames in both directions
    async fn connect_and_stream(
        target: &ConnectTarget,
        config: &TransportConfig,
        state: &AtomicU8,
        events: &mpsc::Sender<TransportEvent>,
        outbound: &mut mpsc::UnboundedReceiver<Outbound>,
    ) -> Result<(u16, String), WsError> {
        tracing::debug!(url = %target.url, "Opening WebSocket");

        let request = build_request(target)?;
        // Only a close can be queued before the socket is open
        let (ws_stream, _response) = tokio::select! {
            result = connect_async(request) => {
                result.map_err(|e| WsError::ConnectionFailed(e.to_string()))?
            }
            _ = outbound.recv() => {
                tracing::debug!(url = %target.url, "Closed during handshake");
                return Ok((CLOSE_NORMAL, "closed before open".into()));
            }
        };

        let (mut write, mut read) = ws_stream.split();

        let opened = state.compare_exchange(
            ReadyState::Connecting as u8,
            ReadyState::Open as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if opened.is_err() {
            let _ = write.send(Message::Close(None)).await;
            return Ok((CLOSE_NORMAL, "closed before open".into()));
        }
        if events.send(TransportEvent::Open).await.is_err() {
            return Ok((CLOSE_NORMAL, "event receiver dropped".into()));
        }

        let mut ping_interval = tokio::time::interval(config.ping_interval);
        ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // first tick completes immediately
        ping_interval.tick().await;
        let mut waiting_for_pong = false;

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if events.send(TransportEvent::Message(text)).await.is_err() {
                                return Ok((CLOSE_NORMAL, "event receiver dropped".into()));
                            }
                        }
                        Some(Ok(Message::Binary(data))) => {
                            let text = String::from_utf8_lossy(&data).into_owned();
                            if events.send(TransportEvent::Message(text)).await.is_err() {
                                return Ok((CLOSE_NORMAL, "event receiver dropped".into()));
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await
                                .map_err(|e| WsError::SendFailed(e.to_string()))?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            waiting_for_pong = false;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::debug!(url = %target.url, "Received close frame");
                            return Ok(frame
                                .map(|f| (u16::from(f.code), f.reason.to_string()))
                                .unwrap_or((CLOSE_NORMAL, String::new())));
                        }
                        Some(Ok(Message::Frame(_))) => {}
                        Some(Err(e)) => {
                            return Err(WsError::Transport(e.to_string()));
                        }
                        None => {
                            return Ok((CLOSE_ABNORMAL, "stream ended".into()));
                        }
                    }
                }

                cmd = outbound.recv() => {
                    match cmd {
                        Some(Outbound::Text(text)) => {
                            write.send(Message::Text(text)).await
                                .map_err(|e| WsError::SendFailed(e.to_string()))?;
                        }
                        Some(Outbound::Close) | None => {
                            let _ = write.send(Message::Close(None)).await;
                            return Ok((CLOSE_NORMAL, "closed locally".into()));
                        }
                    }
                }

                _ = ping_interval.tick() => {
                    if waiting_for_pong {
                        return Err(WsError::Transport("pong timeout".into()));
                    }
                    write.send(Message::Ping(vec![])).await
                        .map_err(|e| WsError::SendFailed(e.to_string()))?;
                    waiting_for_pong = true;
                }
            }
        }
    }
}

impl Transport for TungsteniteTransport {
    fn open(&self, target: &ConnectTarget) -> TransportLink {
        let (event_tx, event_rx) = mpsc::channel(self.config.event_buffer);
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let state = Arc::new(AtomicU8::new(ReadyState::Connecting as u8));

        tokio::spawn(Self::run(
            target.clone(),
            self.config.clone(),
            state.clone(),
            event_tx,
            out_rx,
        ));

        TransportLink {
            sink: Arc::new(TungsteniteSink {
                state,
                outbound: out_tx,
            }),
            events: event_rx,
        }
    }
}

/// Build the handshake request with injected headers and subprotocols
fn build_request(
    target: &ConnectTarget,
) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request, WsError> {
    let mut request = target
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| WsError::ConnectionFailed(e.to_string()))?;

    let headers = request.headers_mut();
    for (name, value) in &target.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| WsError::ConnectionFailed(format!("invalid header {}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| WsError::ConnectionFailed(format!("invalid header value: {}", e)))?;
        headers.insert(name, value);
    }

    if !target.subprotocols.is_empty() {
        let value = HeaderValue::from_str(&target.subprotocols.join(", "))
            .map_err(|e| WsError::ConnectionFailed(format!("invalid subprotocol: {}", e)))?;
        headers.insert("Sec-WebSocket-Protocol", value);
    }

    Ok(request)
}
