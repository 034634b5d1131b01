//! ws-manager: managed WebSocket connections
//!
//! This library provides:
//! - Credential resolution (bearer token or session cookies) before each handshake
//! - A connection registry that deduplicates by effective URL
//! - Lifecycle driving with fixed-interval, cancellable reconnects
//! - Inbound dispatch to named function handlers through a middleware pipeline
//! - Outbound JSON sends with readiness checks
//! - A minimal broadcast server mode
//! - Structured logging and Prometheus metrics

pub mod auth;
pub mod cli;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod manager;
pub mod server;
pub mod telemetry;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod ws;

pub use manager::WsManager;
