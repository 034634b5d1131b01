//! Connection identity, live handles and reconnect lineage

use crate::telemetry::{self, CounterMetric};
use crate::ws::{ReadyState, TransportSink, WsError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::any::Any;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::RwLock;
use tokio::task::AbortHandle;
use uuid::Uuid;

/// Canonical identity of a connection: the effective URL, including any
/// query-string credential appended during resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnectionKey(String);

impl ConnectionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ConnectionKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for ConnectionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ConnectionKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Lifecycle state of a registered connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Open = 1,
    /// Transport reported an error; a close is expected next
    Error = 2,
    Closed = 3,
}

impl From<u8> for ConnectionState {
    fn from(v: u8) -> Self {
        match v {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Open,
            2 => ConnectionState::Error,
            _ => ConnectionState::Closed,
        }
    }
}

/// Per-connection event names accepted by `on`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Open,
    Message,
    Close,
    Error,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Open => "open",
            EventKind::Message => "message",
            EventKind::Close => "close",
            EventKind::Error => "error",
        }
    }
}

impl FromStr for EventKind {
    type Err = WsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(EventKind::Open),
            "message" => Ok(EventKind::Message),
            "close" => Ok(EventKind::Close),
            "error" => Ok(EventKind::Error),
            other => Err(WsError::UnknownEvent(other.to_string())),
        }
    }
}

/// Payload delivered to per-connection listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    Open,
    /// Raw inbound text, before middleware
    Message(String),
    Close { code: u16, reason: String },
    Error(String),
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::Open => EventKind::Open,
            EventPayload::Message(_) => EventKind::Message,
            EventPayload::Close { .. } => EventKind::Close,
            EventPayload::Error(_) => EventKind::Error,
        }
    }
}

/// Listener registered through `on`
pub type EventCallback = Arc<dyn Fn(&EventPayload) + Send + Sync>;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

/// Run a caller callback; a panic is logged and swallowed so the
/// connection's driver keeps running
pub(crate) fn guarded(key: &ConnectionKey, callback: &str, f: impl FnOnce()) {
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(f)) {
        tracing::error!(url = %key, callback, error = %panic_message(panic.as_ref()), "Callback panicked");
    }
}

#[derive(Default)]
struct LineageState {
    cancelled: bool,
    timer: Option<AbortHandle>,
    current: Option<Weak<HandleInner>>,
}

/// Shared by one `connect` call and every reconnect it spawns.
///
/// The cancelled flag, the pending timer and the committed handle live
/// under one mutex so an explicit close and a reconnect commit are
/// linearizable.
#[derive(Default)]
pub(crate) struct Lineage {
    state: Mutex<LineageState>,
}

impl Lineage {
    pub(crate) fn is_cancelled(&self) -> bool {
        lock(&self.state).cancelled
    }

    /// Mark cancelled, abort a pending timer and hand back the live handle
    pub(crate) fn cancel(&self) -> Option<ConnectionHandle> {
        let mut state = lock(&self.state);
        state.cancelled = true;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state
            .current
            .take()
            .and_then(|weak| weak.upgrade())
            .map(|inner| ConnectionHandle { inner })
    }

    /// Record the handle produced by a connect attempt; refused once cancelled
    pub(crate) fn commit(&self, handle: &ConnectionHandle) -> bool {
        let mut state = lock(&self.state);
        if state.cancelled {
            return false;
        }
        state.timer = None;
        state.current = Some(Arc::downgrade(&handle.inner));
        true
    }

    /// Store the reconnect timer; aborts it right away if already cancelled
    pub(crate) fn arm(&self, timer: AbortHandle) -> bool {
        let mut state = lock(&self.state);
        if state.cancelled {
            timer.abort();
            return false;
        }
        state.current = None;
        state.timer = Some(timer);
        true
    }
}

struct HandleInner {
    id: Uuid,
    key: ConnectionKey,
    url: String,
    created_at: DateTime<Utc>,
    state: AtomicU8,
    sink: Arc<dyn TransportSink>,
    listeners: RwLock<HashMap<EventKind, Vec<EventCallback>>>,
    lineage: Arc<Lineage>,
}

/// Live connection. Cheap to clone; clones refer to the same socket.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<HandleInner>,
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.inner.id)
            .field("key", &self.inner.key)
            .field("state", &self.state())
            .finish()
    }
}

impl ConnectionHandle {
    /// Wrap a transport sink as a standalone handle
    pub fn new(key: ConnectionKey, url: impl Into<String>, sink: Arc<dyn TransportSink>) -> Self {
        Self::with_lineage(key, url.into(), sink, Arc::new(Lineage::default()))
    }

    pub(crate) fn with_lineage(
        key: ConnectionKey,
        url: String,
        sink: Arc<dyn TransportSink>,
        lineage: Arc<Lineage>,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id: Uuid::new_v4(),
                key,
                url,
                created_at: Utc::now(),
                state: AtomicU8::new(ConnectionState::Connecting as u8),
                sink,
                listeners: RwLock::new(HashMap::new()),
                lineage,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Effective key the handle is registered under
    pub fn key(&self) -> &ConnectionKey {
        &self.inner.key
    }

    /// Caller-supplied URL, before credential injection
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from(self.inner.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.inner.state.store(state as u8, Ordering::Release);
    }

    pub fn ready_state(&self) -> ReadyState {
        self.inner.sink.ready_state()
    }

    /// True when the transport accepts sends
    pub fn is_ready(&self) -> bool {
        self.ready_state() == ReadyState::Open
    }

    /// Same underlying connection
    pub fn ptr_eq(&self, other: &ConnectionHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn lineage(&self) -> &Arc<Lineage> {
        &self.inner.lineage
    }

    /// Send a raw text frame
    pub fn send_text(&self, text: impl Into<String>) -> Result<(), WsError> {
        if !self.is_ready() {
            return Err(WsError::NotConnected(self.inner.key.to_string()));
        }
        self.inner.sink.send(text.into())?;
        telemetry::increment(CounterMetric::MessagesSent);
        Ok(())
    }

    /// JSON-encode and send
    pub fn send_json<T: Serialize + ?Sized>(&self, data: &T) -> Result<(), WsError> {
        let text = serde_json::to_string(data).map_err(|e| WsError::Serialization(e.to_string()))?;
        self.send_text(text)
    }

    /// Ask the transport to close
    pub fn close(&self) {
        self.inner.sink.close();
    }

    /// Register a per-connection listener
    pub async fn on<F>(&self, kind: EventKind, callback: F)
    where
        F: Fn(&EventPayload) + Send + Sync + 'static,
    {
        self.inner
            .listeners
            .write()
            .await
            .entry(kind)
            .or_default()
            .push(Arc::new(callback));
    }

    pub(crate) async fn emit(&self, payload: &EventPayload) {
        let callbacks = self
            .inner
            .listeners
            .read()
            .await
            .get(&payload.kind())
            .cloned()
            .unwrap_or_default();

        for callback in callbacks {
            guarded(self.key(), payload.kind().as_str(), || callback(payload));
        }
    }
}
