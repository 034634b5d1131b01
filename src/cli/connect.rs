//! Connect command implementation

use crate::config::Config;
use crate::connection::{ConnectionHandle, ConnectionOptions};
use crate::manager::WsManager;
use clap::Args;
use serde_json::Value;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Extra URLs to connect to, besides the configured connections
    pub urls: Vec<String>,

    /// Reconnect the extra URLs when they close
    #[arg(long)]
    pub auto_reconnect: bool,

    /// Reconnect delay for the extra URLs
    #[arg(long)]
    pub reconnect_interval_ms: Option<u64>,
}

impl ConnectArgs {
    fn targets(&self, config: &Config) -> Vec<(String, ConnectionOptions)> {
        let mut targets: Vec<_> = config
            .connections
            .iter()
            .map(|c| (c.url.clone(), c.options.clone()))
            .collect();

        for url in &self.urls {
            let mut options = ConnectionOptions::new().auto_reconnect(self.auto_reconnect);
            if let Some(ms) = self.reconnect_interval_ms {
                options = options.reconnect_interval(Duration::from_millis(ms));
            }
            targets.push((url.clone(), options));
        }
        targets
    }

    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let targets = self.targets(config);
        if targets.is_empty() {
            anyhow::bail!("No connections configured and no URL given");
        }

        let manager = WsManager::new();
        manager
            .register_function("echo", |data: Value, conn: ConnectionHandle| async move {
                conn.send_json(&serde_json::json!({ "function": "echo", "data": data }))?;
                anyhow::Ok(())
            })
            .await;

        for (url, options) in targets {
            let options = options.on_message(|payload, conn| {
                tracing::info!(url = %conn.key(), message = %payload, "Message");
            });
            let handle = manager.connect(url, options).await?;
            tracing::info!(url = %handle.key(), "Connection registered");
        }

        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutting down");
        manager.close_all().await;
        Ok(())
    }
}
