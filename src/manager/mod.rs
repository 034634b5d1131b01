//! Connection manager
//!
//! Owns the registry, the dispatcher and the reconnect table for one set of
//! named connections. Create one with [`WsManager::new`], drive it through
//! `connect`/`send`, and shut it down with `close_all`.

mod gateway;
mod lifecycle;

use crate::auth::{CredentialResolver, HttpClient, ReqwestHttpClient, ResolvedCredentials};
use crate::connection::{
    compose_target, lock, ConnectionHandle, ConnectionKey, ConnectionOptions, ConnectionRegistry,
    Lineage,
};
use crate::dispatch::{Dispatcher, FunctionHandler, Middleware};
use crate::server::BroadcastServer;
use crate::telemetry::{self, CounterMetric, GaugeMetric};
use crate::ws::{Transport, TransportConfig, TungsteniteTransport, WsError};
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};

pub(crate) struct ManagerInner {
    registry: ConnectionRegistry,
    dispatcher: Dispatcher,
    resolver: CredentialResolver,
    transport: Arc<dyn Transport>,
    /// Lineages waiting for their reconnect, keyed by the key that closed
    pending: Mutex<HashMap<ConnectionKey, Arc<Lineage>>>,
}

/// Managed WebSocket connections. Clones share the same state.
#[derive(Clone)]
pub struct WsManager {
    inner: Arc<ManagerInner>,
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}

impl WsManager {
    /// Manager using tokio-tungstenite sockets and a reqwest credential client
    pub fn new() -> Self {
        Self::with_parts(
            Arc::new(TungsteniteTransport::new(TransportConfig::default())),
            Arc::new(ReqwestHttpClient::default()),
        )
    }

    /// Manager over custom transport and HTTP capabilities
    pub fn with_parts(transport: Arc<dyn Transport>, http: Arc<dyn HttpClient>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                registry: ConnectionRegistry::new(),
                dispatcher: Dispatcher::default(),
                resolver: CredentialResolver::new(http),
                transport,
                pending: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Connect to `url`, or return the live connection already registered
    /// under the same effective key.
    ///
    /// Credentials are resolved first; a failed fetch connects without them.
    /// The returned handle may still be connecting.
    pub async fn connect(
        &self,
        url: impl Into<String>,
        options: ConnectionOptions,
    ) -> Result<ConnectionHandle, WsError> {
        let lineage = Arc::new(Lineage::default());
        self.inner
            .clone()
            .connect_with(url.into(), Arc::new(options), lineage)
            .await
    }

    /// Register a handler for `{"function": name}` payloads
    pub async fn register_function<H>(&self, name: impl Into<String>, handler: H)
    where
        H: FunctionHandler + 'static,
    {
        self.inner.dispatcher.functions().register(name, handler).await;
    }

    pub async fn unregister_function(&self, name: &str) -> bool {
        self.inner.dispatcher.functions().unregister(name).await
    }

    /// Append a middleware to the inbound pipeline
    pub async fn use_middleware<M>(&self, middleware: M)
    where
        M: Middleware + 'static,
    {
        self.inner.dispatcher.middleware().push(middleware).await;
    }

    /// Start the broadcast server on all interfaces
    pub async fn start_server(&self, port: u16) -> Result<BroadcastServer, WsError> {
        BroadcastServer::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))).await
    }

    pub async fn get(&self, key: &str) -> Option<ConnectionHandle> {
        self.inner.registry.get(key).await
    }

    pub async fn is_connected(&self, key: &str) -> bool {
        self.inner.registry.has(key).await
    }

    /// Registered keys, sorted
    pub async fn keys(&self) -> Vec<ConnectionKey> {
        self.inner.registry.keys().await
    }

    /// True while a reconnect for `key` is scheduled or resolving
    pub fn is_reconnect_pending(&self, key: &str) -> bool {
        lock(&self.inner.pending).contains_key(key)
    }
}

impl ManagerInner {
    /// Resolving → dedup gate → Connecting, for a first connect or a reconnect
    pub(crate) async fn connect_with(
        self: Arc<Self>,
        url: String,
        options: Arc<ConnectionOptions>,
        lineage: Arc<Lineage>,
    ) -> Result<ConnectionHandle, WsError> {
        tracing::debug!(url = %url, "Resolving credentials");
        let credentials = ResolvedCredentials {
            token: self.resolver.resolve_token(options.auth.as_ref()).await,
            cookies: self.resolver.resolve_session(options.session_auth.as_ref()).await,
        };

        if lineage.is_cancelled() {
            tracing::debug!(url = %url, "Connect aborted by explicit close");
            return Err(WsError::Cancelled(url));
        }

        let target = compose_target(&url, &options, &credentials);
        let key = ConnectionKey::from(target.url.clone());
        let mut events = None;

        let (handle, inserted) = self
            .registry
            .insert_with(key.clone(), || {
                if lineage.is_cancelled() {
                    return Err(WsError::Cancelled(url.clone()));
                }
                let link = self.transport.open(&target);
                let handle =
                    ConnectionHandle::with_lineage(key.clone(), url.clone(), link.sink, lineage.clone());
                if !lineage.commit(&handle) {
                    handle.close();
                    return Err(WsError::Cancelled(url.clone()));
                }
                events = Some(link.events);
                Ok(handle)
            })
            .await?;

        let Some(events) = events.filter(|_| inserted) else {
            tracing::info!(url = %key, "Already connected");
            return Ok(handle);
        };

        tracing::info!(url = %key, id = %handle.id(), "Connecting");
        telemetry::increment(CounterMetric::ConnectionsOpened);
        telemetry::set_gauge(GaugeMetric::OpenConnections, self.registry.len().await as f64);

        tokio::spawn(
            self.clone()
                .drive(handle.clone(), events, url, options, lineage),
        );

        Ok(handle)
    }
}
