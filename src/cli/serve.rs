//! Serve command implementation

use crate::config::Config;
use crate::manager::WsManager;
use clap::Args;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Port to listen on (defaults to the configured port)
    #[arg(short, long)]
    pub port: Option<u16>,
}

impl ServeArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let port = self.port.unwrap_or(config.server.port);
        let manager = WsManager::new();
        let server = manager.start_server(port).await?;

        tracing::info!(addr = %server.local_addr(), "Broadcast server started");
        tokio::signal::ctrl_c().await?;

        server.shutdown();
        tracing::info!(last_message = %server.last_message().await, "Server stopped");
        Ok(())
    }
}
