//! Inbound message classification and routing

use super::functions::FunctionRegistry;
use super::middleware::MiddlewarePipeline;
use crate::connection::{guarded, panic_message, ConnectionHandle, ConnectionOptions};
use crate::telemetry::{self, CounterMetric};
use crate::ws::WsError;
use futures_util::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;

/// Shape of a parsed inbound payload, highest priority first
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    /// `{"type": "ping" | "heartbeat"}`
    Heartbeat,
    /// `{"function": <name>, "data": ...}`
    FunctionCall { name: String },
    /// `{"event": <name>, ...}`
    Event { name: String },
    /// Top-level array
    Batch { len: usize },
    Opaque,
}

impl MessageKind {
    pub fn classify(payload: &Value) -> Self {
        if let Some(kind) = payload.get("type").and_then(Value::as_str) {
            if kind == "ping" || kind == "heartbeat" {
                return MessageKind::Heartbeat;
            }
        }
        if let Some(name) = payload.get("function").and_then(Value::as_str) {
            return MessageKind::FunctionCall {
                name: name.to_string(),
            };
        }
        if let Some(event) = payload.get("event").filter(|v| is_truthy(v)) {
            let name = match event {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return MessageKind::Event { name };
        }
        if let Value::Array(items) = payload {
            return MessageKind::Batch { len: items.len() };
        }
        MessageKind::Opaque
    }
}

/// `null`, `false`, `0` and `""` do not name an event
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// What happened to one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Not valid JSON; dropped
    Malformed,
    Heartbeat,
    /// Registered handler ran to completion
    Handled { function: String },
    /// Registered handler returned an error or panicked
    HandlerFault { function: String, error: String },
    UnknownFunction { function: String },
    Event { event: String },
    Batch { len: usize },
    Opaque,
}

/// Routes inbound text through middleware, classification and handlers
#[derive(Clone, Default)]
pub struct Dispatcher {
    functions: FunctionRegistry,
    middleware: MiddlewarePipeline,
}

impl Dispatcher {
    pub fn new(functions: FunctionRegistry, middleware: MiddlewarePipeline) -> Self {
        Self {
            functions,
            middleware,
        }
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn middleware(&self) -> &MiddlewarePipeline {
        &self.middleware
    }

    /// Dispatch one raw message.
    ///
    /// Only a middleware failure is returned as an error. Parse failures,
    /// unknown functions and handler faults are logged and reported through
    /// the outcome. `on_message` runs for every parsed payload, whatever
    /// its classification.
    pub async fn dispatch(
        &self,
        raw: String,
        handle: &ConnectionHandle,
        options: &ConnectionOptions,
    ) -> Result<DispatchOutcome, WsError> {
        let text = self.middleware.run(raw).await.map_err(|e| {
            telemetry::increment(CounterMetric::DispatchFailures);
            WsError::Middleware(format!("{:#}", e))
        })?;

        let parsed: Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(e) => {
                telemetry::increment(CounterMetric::DispatchFailures);
                tracing::error!(url = %handle.key(), error = %e, message = %text, "Invalid WebSocket message format");
                return Ok(DispatchOutcome::Malformed);
            }
        };

        let outcome = match MessageKind::classify(&parsed) {
            MessageKind::Heartbeat => DispatchOutcome::Heartbeat,
            MessageKind::FunctionCall { name } => self.call_function(name, &parsed, handle).await,
            MessageKind::Event { name } => {
                let data = parsed.get("data").unwrap_or(&Value::Null);
                tracing::info!(url = %handle.key(), event = %name, data = %data, "Event received");
                DispatchOutcome::Event { event: name }
            }
            MessageKind::Batch { len } => {
                tracing::info!(url = %handle.key(), len, "Array message received");
                DispatchOutcome::Batch { len }
            }
            MessageKind::Opaque => {
                tracing::debug!(url = %handle.key(), message = %parsed, "WebSocket message received");
                DispatchOutcome::Opaque
            }
        };

        if let Some(on_message) = &options.callbacks.on_message {
            guarded(handle.key(), "on_message", || on_message(&parsed, handle));
        }

        Ok(outcome)
    }

    async fn call_function(
        &self,
        name: String,
        payload: &Value,
        handle: &ConnectionHandle,
    ) -> DispatchOutcome {
        let Some(handler) = self.functions.get(&name).await else {
            let available = self.functions.names().await;
            tracing::warn!(
                url = %handle.key(),
                function = %name,
                available = ?available,
                "Unknown function"
            );
            return DispatchOutcome::UnknownFunction { function: name };
        };

        let data = payload.get("data").cloned().unwrap_or(Value::Null);
        tracing::debug!(url = %handle.key(), function = %name, "Running function");

        let result = AssertUnwindSafe(handler.call(data, handle.clone()))
            .catch_unwind()
            .await;

        let error = match result {
            Ok(Ok(())) => return DispatchOutcome::Handled { function: name },
            Ok(Err(e)) => format!("{:#}", e),
            Err(panic) => panic_message(panic.as_ref()),
        };

        telemetry::increment(CounterMetric::DispatchFailures);
        tracing::error!(url = %handle.key(), function = %name, error = %error, "Function handler failed");
        DispatchOutcome::HandlerFault {
            function: name,
            error,
        }
    }
}
