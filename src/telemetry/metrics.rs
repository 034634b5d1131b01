//! Prometheus metrics

use std::net::{Ipv4Addr, SocketAddr};

/// Monotonic counters
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Handshakes started
    ConnectionsOpened,
    /// Reconnects scheduled after a close
    ReconnectsScheduled,
    /// Inbound frames
    MessagesReceived,
    /// Outbound frames
    MessagesSent,
    /// Malformed payloads, middleware rejections and handler faults
    DispatchFailures,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Registered connections
    OpenConnections,
    /// Peers attached to the broadcast server
    ServerPeers,
}

fn counter_name(metric: CounterMetric) -> &'static str {
    match metric {
        CounterMetric::ConnectionsOpened => "wsm_connections_opened_total",
        CounterMetric::ReconnectsScheduled => "wsm_reconnects_scheduled_total",
        CounterMetric::MessagesReceived => "wsm_messages_received_total",
        CounterMetric::MessagesSent => "wsm_messages_sent_total",
        CounterMetric::DispatchFailures => "wsm_dispatch_failures_total",
    }
}

fn gauge_name(metric: GaugeMetric) -> &'static str {
    match metric {
        GaugeMetric::OpenConnections => "wsm_open_connections",
        GaugeMetric::ServerPeers => "wsm_server_peers",
    }
}

/// Increment a counter by one
pub fn increment(metric: CounterMetric) {
    metrics::counter!(counter_name(metric)).increment(1);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    metrics::gauge!(gauge_name(metric)).set(value);
}

/// Serve `/metrics` on the given port. Must run inside a tokio runtime.
pub fn install_exporter(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics exporter: {}", e))?;

    tracing::info!(%addr, "Prometheus exporter listening");
    Ok(())
}
