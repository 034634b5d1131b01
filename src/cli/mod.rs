//! CLI interface for ws-manager
//!
//! Provides subcommands for:
//! - `connect`: Open managed connections and log inbound traffic
//! - `serve`: Run the broadcast server
//! - `config`: Show configuration

mod connect;
mod serve;

pub use connect::ConnectArgs;
pub use serve::ServeArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "ws-manager")]
#[command(about = "Managed WebSocket connections with auth, reconnection and function dispatch")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open connections and log inbound messages until Ctrl-C
    Connect(ConnectArgs),
    /// Run the broadcast server until Ctrl-C
    Serve(ServeArgs),
    /// Show configuration
    Config,
}
