//! In-memory doubles for the transport and HTTP capabilities.
//!
//! Used by the test suites and benchmarks to drive the manager without a
//! network: every handshake is recorded and the test pushes transport
//! events by hand.

use crate::auth::{AuthError, HttpClient, HttpRequest, HttpResponse};
use crate::connection::{lock, ConnectionHandle, ConnectionKey};
use crate::ws::{ConnectTarget, ReadyState, Transport, TransportEvent, TransportLink, TransportSink, WsError};
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Sink that records every frame it accepts
pub struct MockSink {
    state: AtomicU8,
    sent: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl MockSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(ReadyState::Connecting as u8),
            sent: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Sink that is already open
    pub fn open() -> Arc<Self> {
        let sink = Self::new();
        sink.set_ready_state(ReadyState::Open);
        sink
    }

    pub fn set_ready_state(&self, state: ReadyState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Frames written so far
    pub fn sent(&self) -> Vec<String> {
        lock(&self.sent).clone()
    }

    /// True once `close` was called
    pub fn close_requested(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl TransportSink for MockSink {
    fn ready_state(&self) -> ReadyState {
        ReadyState::from(self.state.load(Ordering::SeqCst))
    }

    fn send(&self, text: String) -> Result<(), WsError> {
        if self.ready_state() != ReadyState::Open {
            return Err(WsError::NotConnected("mock sink is not open".into()));
        }
        lock(&self.sent).push(text);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.set_ready_state(ReadyState::Closing);
    }
}

/// Standalone handle over a sink, keyed `mock://detached`
pub fn detached_handle(sink: Arc<MockSink>) -> ConnectionHandle {
    ConnectionHandle::new(ConnectionKey::from("mock://detached"), "mock://detached", sink)
}

/// Test-side end of one handshake made through [`MockTransport`]
pub struct MockLink {
    pub target: ConnectTarget,
    pub sink: Arc<MockSink>,
    events: mpsc::Sender<TransportEvent>,
}

impl MockLink {
    /// Complete the handshake
    pub async fn open(&self) {
        self.sink.set_ready_state(ReadyState::Open);
        let _ = self.events.send(TransportEvent::Open).await;
    }

    /// Deliver an inbound text frame
    pub async fn message(&self, text: impl Into<String>) {
        let _ = self.events.send(TransportEvent::Message(text.into())).await;
    }

    pub async fn error(&self, error: impl Into<String>) {
        let _ = self.events.send(TransportEvent::Error(error.into())).await;
    }

    /// Close from the remote side
    pub async fn close(&self, code: u16, reason: impl Into<String>) {
        self.sink.set_ready_state(ReadyState::Closed);
        let _ = self
            .events
            .send(TransportEvent::Close {
                code,
                reason: reason.into(),
            })
            .await;
    }
}

/// Transport that records handshakes and hands each link to the test
pub struct MockTransport {
    handshakes: AtomicUsize,
    auto_open: bool,
    links: mpsc::UnboundedSender<MockLink>,
}

impl MockTransport {
    /// Links stay in `Connecting` until the test calls [`MockLink::open`]
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockLink>) {
        Self::build(false)
    }

    /// Every handshake completes immediately
    pub fn auto_open() -> (Arc<Self>, mpsc::UnboundedReceiver<MockLink>) {
        Self::build(true)
    }

    fn build(auto_open: bool) -> (Arc<Self>, mpsc::UnboundedReceiver<MockLink>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            handshakes: AtomicUsize::new(0),
            auto_open,
            links: tx,
        });
        (transport, rx)
    }

    /// Number of `open` calls so far
    pub fn handshakes(&self) -> usize {
        self.handshakes.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    fn open(&self, target: &ConnectTarget) -> TransportLink {
        self.handshakes.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(64);
        let sink = MockSink::new();

        if self.auto_open {
            sink.set_ready_state(ReadyState::Open);
            let _ = tx.try_send(TransportEvent::Open);
        }

        let _ = self.links.send(MockLink {
            target: target.clone(),
            sink: sink.clone(),
            events: tx,
        });

        TransportLink { sink, events: rx }
    }
}

type Responder = dyn Fn(usize) -> Result<HttpResponse, AuthError> + Send + Sync;

/// HTTP client answering from a closure of the call index
pub struct MockHttpClient {
    responder: Box<Responder>,
    delay: Option<Duration>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockHttpClient {
    pub fn respond<F>(responder: F) -> Arc<Self>
    where
        F: Fn(usize) -> Result<HttpResponse, AuthError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            responder: Box::new(responder),
            delay: None,
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Always answers `{"token": <token>}`
    pub fn token(token: &str) -> Arc<Self> {
        let token = token.to_string();
        Self::respond(move |_| Ok(HttpResponse::json(json!({ "token": token }))))
    }

    /// Answers `{"token": "t<n>"}` for the n-th call, starting at 1
    pub fn numbered_tokens() -> Arc<Self> {
        Self::respond(|n| Ok(HttpResponse::json(json!({ "token": format!("t{}", n + 1) }))))
    }

    /// Same responder, but every request waits `delay` first
    pub fn delayed<F>(delay: Duration, responder: F) -> Arc<Self>
    where
        F: Fn(usize) -> Result<HttpResponse, AuthError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            responder: Box::new(responder),
            delay: Some(delay),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn last_request(&self) -> Option<HttpRequest> {
        lock(&self.requests).last().cloned()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse, AuthError> {
        let index = {
            let mut requests = lock(&self.requests);
            requests.push(request);
            requests.len() - 1
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.responder)(index)
    }
}
