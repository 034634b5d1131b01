//! Outbound sends, explicit close and per-connection listeners

use super::WsManager;
use crate::connection::{lock, EventKind, EventPayload};
use crate::telemetry::{self, GaugeMetric};
use crate::ws::WsError;
use serde::Serialize;

impl WsManager {
    /// JSON-encode `data` and send it on the connection registered under `key`.
    ///
    /// Fails with `NotConnected`, writing nothing, when the key is unknown
    /// or its transport is not ready.
    pub async fn send<T>(&self, key: &str, data: &T) -> Result<(), WsError>
    where
        T: Serialize + ?Sized,
    {
        let Some(handle) = self.inner.registry.get(key).await else {
            tracing::error!(url = %key, "WebSocket is not open");
            return Err(WsError::NotConnected(key.to_string()));
        };

        handle.send_json(data).inspect_err(|e| {
            tracing::error!(url = %key, error = %e, "Send failed");
        })
    }

    /// Close the connection under `key` and cancel any reconnect scheduled
    /// for it. Returns false when nothing was registered or pending.
    pub async fn close(&self, key: &str) -> bool {
        let mut found = false;

        if let Some(handle) = self.inner.registry.remove(key).await {
            handle.lineage().cancel();
            handle.close();
            found = true;
        }

        let pending = lock(&self.inner.pending).remove(key);
        if let Some(lineage) = pending {
            if let Some(handle) = lineage.cancel() {
                self.inner
                    .registry
                    .remove_if(handle.key().as_str(), &handle)
                    .await;
                handle.close();
            }
            found = true;
        }

        if found {
            tracing::info!(url = %key, "Connection closed by caller");
            telemetry::set_gauge(GaugeMetric::OpenConnections, self.inner.registry.len().await as f64);
        }
        found
    }

    /// Close every connection and cancel every pending reconnect
    pub async fn close_all(&self) {
        for (key, handle) in self.inner.registry.drain().await {
            tracing::debug!(url = %key, "Closing");
            handle.lineage().cancel();
            handle.close();
        }

        let pending: Vec<_> = lock(&self.inner.pending).drain().collect();
        for (key, lineage) in pending {
            tracing::debug!(url = %key, "Cancelling reconnect");
            if let Some(handle) = lineage.cancel() {
                self.inner
                    .registry
                    .remove_if(handle.key().as_str(), &handle)
                    .await;
                handle.close();
            }
        }

        telemetry::set_gauge(GaugeMetric::OpenConnections, 0.0);
        tracing::info!("All connections closed");
    }

    /// Register a listener for `open`, `message`, `close` or `error` on the
    /// connection under `key`
    pub async fn on<F>(&self, key: &str, event: &str, callback: F) -> Result<(), WsError>
    where
        F: Fn(&EventPayload) + Send + Sync + 'static,
    {
        let kind: EventKind = event.parse()?;
        let handle = self
            .inner
            .registry
            .get(key)
            .await
            .ok_or_else(|| WsError::NotConnected(key.to_string()))?;

        handle.on(kind, callback).await;
        Ok(())
    }
}
