//! Configuration types for ws-manager

use crate::connection::ConnectionOptions;
use crate::server::DEFAULT_SERVER_PORT;
use crate::telemetry::LogFormat;
use serde::Deserialize;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Serve Prometheus metrics on this port when set
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

/// Broadcast server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_port() -> u16 {
    DEFAULT_SERVER_PORT
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_SERVER_PORT,
        }
    }
}

/// One connection opened by the `connect` command
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    pub url: String,
    #[serde(flatten)]
    pub options: ConnectionOptions,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
