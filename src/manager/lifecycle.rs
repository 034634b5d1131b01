//! Per-connection event loop and reconnect scheduling

use super::ManagerInner;
use crate::connection::{
    guarded, lock, ConnectionHandle, ConnectionKey, ConnectionOptions, ConnectionState,
    EventPayload, Lineage,
};
use crate::telemetry::{self, CounterMetric, GaugeMetric};
use crate::ws::{TransportEvent, WsError};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Close code reported when the event stream ends without a close event
const CLOSE_ABNORMAL: u16 = 1006;

impl ManagerInner {
    /// Consume one transport's events until it closes
    pub(crate) async fn drive(
        self: Arc<Self>,
        handle: ConnectionHandle,
        mut events: mpsc::Receiver<TransportEvent>,
        url: String,
        options: Arc<ConnectionOptions>,
        lineage: Arc<Lineage>,
    ) {
        let (code, reason) = loop {
            match events.recv().await {
                Some(TransportEvent::Open) => {
                    self.handle_open(&handle, &options, &lineage).await
                }
                Some(TransportEvent::Message(text)) => {
                    self.handle_message(&handle, &options, text).await
                }
                Some(TransportEvent::Error(error)) => {
                    self.handle_error(&handle, &options, error).await
                }
                Some(TransportEvent::Close { code, reason }) => break (code, reason),
                None => break (CLOSE_ABNORMAL, "transport dropped".to_string()),
            }
        };

        self.handle_close(&handle, code, reason).await;
        self.schedule_reconnect(&handle, url, options, lineage);
    }

    async fn handle_open(
        &self,
        handle: &ConnectionHandle,
        options: &ConnectionOptions,
        lineage: &Lineage,
    ) {
        if lineage.is_cancelled() {
            tracing::debug!(url = %handle.key(), "Open ignored after explicit close");
            handle.close();
            return;
        }
        handle.set_state(ConnectionState::Open);
        tracing::info!(url = %handle.key(), id = %handle.id(), "Connected");

        if let Some(message) = &options.auth_message {
            if let Err(e) = handle.send_json(message) {
                tracing::warn!(url = %handle.key(), error = %e, "Failed to send auth message");
            }
        }

        if let Some(on_open) = &options.callbacks.on_open {
            guarded(handle.key(), "on_open", || on_open(handle));
        }
        handle.emit(&EventPayload::Open).await;
    }

    async fn handle_message(
        &self,
        handle: &ConnectionHandle,
        options: &ConnectionOptions,
        text: String,
    ) {
        telemetry::increment(CounterMetric::MessagesReceived);
        handle.emit(&EventPayload::Message(text.clone())).await;

        if let Err(e) = self.dispatcher.dispatch(text, handle, options).await {
            tracing::warn!(url = %handle.key(), error = %e, "Inbound message dropped");
        }
    }

    async fn handle_error(&self, handle: &ConnectionHandle, options: &ConnectionOptions, error: String) {
        handle.set_state(ConnectionState::Error);
        tracing::error!(url = %handle.key(), error = %error, "WebSocket error");

        if let Some(on_error) = &options.callbacks.on_error {
            let err = WsError::Transport(error.clone());
            guarded(handle.key(), "on_error", || on_error(&err));
        }
        handle.emit(&EventPayload::Error(error)).await;
    }

    async fn handle_close(&self, handle: &ConnectionHandle, code: u16, reason: String) {
        handle.set_state(ConnectionState::Closed);
        tracing::info!(url = %handle.key(), code, reason = %reason, "Connection closed");

        self.registry.remove_if(handle.key().as_str(), handle).await;
        telemetry::set_gauge(GaugeMetric::OpenConnections, self.registry.len().await as f64);

        handle.emit(&EventPayload::Close { code, reason }).await;
    }

    /// Schedule a fresh connect with the original URL and options, unless
    /// reconnect is off or the connection was closed explicitly
    fn schedule_reconnect(
        self: &Arc<Self>,
        handle: &ConnectionHandle,
        url: String,
        options: Arc<ConnectionOptions>,
        lineage: Arc<Lineage>,
    ) {
        if !options.auto_reconnect || lineage.is_cancelled() {
            return;
        }

        let key = handle.key().clone();
        let interval = options.effective_reconnect_interval();
        lock(&self.pending).insert(key.clone(), lineage.clone());

        let inner = self.clone();
        let task_key = key.clone();
        let task_lineage = lineage.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            tracing::info!(url = %url, "Reconnecting");

            let result = inner
                .clone()
                .connect_with(url, options, task_lineage.clone())
                .await;
            inner.clear_pending(&task_key, &task_lineage);

            if let Err(e) = result {
                tracing::debug!(url = %task_key, error = %e, "Reconnect abandoned");
            }
        });

        if lineage.arm(task.abort_handle()) {
            telemetry::increment(CounterMetric::ReconnectsScheduled);
            tracing::info!(url = %key, delay_ms = interval.as_millis() as u64, "Reconnect scheduled");
        } else {
            self.clear_pending(&key, &lineage);
        }
    }

    /// Drop the pending entry for `key` if it still belongs to `lineage`
    pub(crate) fn clear_pending(&self, key: &ConnectionKey, lineage: &Arc<Lineage>) {
        let mut pending = lock(&self.pending);
        if pending
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, lineage))
        {
            pending.remove(key);
        }
    }
}
