//! Per-connect configuration

use super::handle::ConnectionHandle;
use crate::auth::AuthConfig;
use crate::ws::WsError;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Delay before a reconnect when none (or zero) is configured
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(5000);

pub type OpenCallback = Arc<dyn Fn(&ConnectionHandle) + Send + Sync>;
pub type MessageCallback = Arc<dyn Fn(&Value, &ConnectionHandle) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&WsError) + Send + Sync>;

/// Lifecycle callbacks; not part of the serialized configuration
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_open: Option<OpenCallback>,
    pub on_message: Option<MessageCallback>,
    pub on_error: Option<ErrorCallback>,
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_open", &self.on_open.is_some())
            .field("on_message", &self.on_message.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Options supplied with each `connect` call
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionOptions {
    /// Token endpoint and placement
    #[serde(default)]
    pub auth: Option<AuthConfig>,
    /// Cookie-issuing endpoint
    #[serde(default)]
    pub session_auth: Option<AuthConfig>,
    /// Sent verbatim right after the socket opens
    #[serde(default)]
    pub auth_message: Option<Value>,
    #[serde(default)]
    pub auto_reconnect: bool,
    #[serde(default)]
    pub reconnect_interval_ms: Option<u64>,
    /// Requested `Sec-WebSocket-Protocol` values
    #[serde(default)]
    pub subprotocols: Vec<String>,
    #[serde(skip)]
    pub callbacks: Callbacks,
}

impl ConnectionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auth(mut self, auth: AuthConfig) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn session_auth(mut self, auth: AuthConfig) -> Self {
        self.session_auth = Some(auth);
        self
    }

    pub fn auth_message(mut self, message: Value) -> Self {
        self.auth_message = Some(message);
        self
    }

    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval_ms = Some(interval.as_millis() as u64);
        self
    }

    pub fn subprotocol(mut self, protocol: impl Into<String>) -> Self {
        self.subprotocols.push(protocol.into());
        self
    }

    pub fn on_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&ConnectionHandle) + Send + Sync + 'static,
    {
        self.callbacks.on_open = Some(Arc::new(f));
        self
    }

    pub fn on_message<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, &ConnectionHandle) + Send + Sync + 'static,
    {
        self.callbacks.on_message = Some(Arc::new(f));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&WsError) + Send + Sync + 'static,
    {
        self.callbacks.on_error = Some(Arc::new(f));
        self
    }

    /// Reconnect delay; zero counts as unset
    pub fn effective_reconnect_interval(&self) -> Duration {
        match self.reconnect_interval_ms {
            Some(ms) if ms > 0 => Duration::from_millis(ms),
            _ => DEFAULT_RECONNECT_INTERVAL,
        }
    }
}
