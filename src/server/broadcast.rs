//! Minimal broadcast server: last message wins, everyone hears it

use crate::telemetry::{self, GaugeMetric};
use crate::ws::WsError;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use uuid::Uuid;

/// Default listening port
pub const DEFAULT_SERVER_PORT: u16 = 5001;

#[derive(Default)]
struct ServerState {
    last_message: RwLock<String>,
    peers: RwLock<HashMap<Uuid, mpsc::UnboundedSender<Message>>>,
}

impl ServerState {
    fn frame(text: &str) -> Message {
        Message::Text(json!({ "lastMessage": text }).to_string())
    }

    /// Overwrite the slot and send it to every connected peer
    async fn publish(&self, text: String) {
        *self.last_message.write().await = text.clone();
        let frame = Self::frame(&text);

        let mut peers = self.peers.write().await;
        peers.retain(|_, tx| tx.send(frame.clone()).is_ok());
        telemetry::set_gauge(GaugeMetric::ServerPeers, peers.len() as f64);
    }
}

/// Running broadcast server. Stops when shut down or dropped.
pub struct BroadcastServer {
    local_addr: SocketAddr,
    state: Arc<ServerState>,
    accept_task: JoinHandle<()>,
}

impl BroadcastServer {
    /// Bind and start accepting peers
    pub async fn bind(addr: SocketAddr) -> Result<Self, WsError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| WsError::Server(format!("bind {}: {}", addr, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| WsError::Server(e.to_string()))?;

        let state = Arc::new(ServerState::default());
        let accept_task = tokio::spawn(Self::accept_loop(listener, state.clone()));

        tracing::info!(%local_addr, "WebSocket server running");
        Ok(Self {
            local_addr,
            state,
            accept_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Most recently received payload; empty before the first message
    pub async fn last_message(&self) -> String {
        self.state.last_message.read().await.clone()
    }

    pub async fn peer_count(&self) -> usize {
        self.state.peers.read().await.len()
    }

    /// Stop accepting peers. Existing peer tasks end when their sockets do.
    pub fn shutdown(&self) {
        self.accept_task.abort();
    }

    async fn accept_loop(listener: TcpListener, state: Arc<ServerState>) {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    tokio::spawn(Self::serve_peer(stream, peer_addr, state.clone()));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed");
                }
            }
        }
    }

    async fn serve_peer(stream: TcpStream, peer_addr: SocketAddr, state: Arc<ServerState>) {
        let ws_stream = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                tracing::warn!(%peer_addr, error = %e, "Handshake failed");
                return;
            }
        };
        let (mut write, mut read) = ws_stream.split();

        let id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let greeting = ServerState::frame(&state.last_message.read().await);
        let _ = tx.send(greeting);
        {
            let mut peers = state.peers.write().await;
            peers.insert(id, tx);
            telemetry::set_gauge(GaugeMetric::ServerPeers, peers.len() as f64);
        }
        tracing::info!(%peer_addr, %id, "Client connected");

        let writer = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if write.send(frame).await.is_err() {
                    break;
                }
            }
        });

        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    tracing::debug!(%peer_addr, message = %text, "New message");
                    state.publish(text).await;
                }
                Ok(Message::Binary(data)) => {
                    state.publish(String::from_utf8_lossy(&data).into_owned()).await;
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(%peer_addr, error = %e, "Peer read failed");
                    break;
                }
            }
        }

        {
            let mut peers = state.peers.write().await;
            peers.remove(&id);
            telemetry::set_gauge(GaugeMetric::ServerPeers, peers.len() as f64);
        }
        writer.abort();
        tracing::info!(%peer_addr, %id, "Client disconnected");
    }
}

impl Drop for BroadcastServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}
