use clap::Parser;
use ws_manager::cli::{Cli, Commands};
use ws_manager::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
            eprintln!("Using default configuration");
            toml::from_str(include_str!("../config.toml.example"))?
        }
    };

    // Initialize telemetry
    ws_manager::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Connect(args) => {
            tracing::info!("Starting managed connections");
            args.execute(&config).await?;
        }
        Commands::Serve(args) => {
            tracing::info!("Starting broadcast server");
            args.execute(&config).await?;
        }
        Commands::Config => {
            println!("Current configuration:");
            println!(
                "  Telemetry: level={} format={:?} metrics_port={:?}",
                config.telemetry.log_level, config.telemetry.log_format, config.telemetry.metrics_port
            );
            println!("  Server: port={}", config.server.port);
            println!("  Connections: {}", config.connections.len());
            for conn in &config.connections {
                println!(
                    "    {} (auto_reconnect={}, interval={:?}, auth={}, session_auth={})",
                    conn.url,
                    conn.options.auto_reconnect,
                    conn.options.effective_reconnect_interval(),
                    conn.options.auth.is_some(),
                    conn.options.session_auth.is_some()
                );
            }
        }
    }

    Ok(())
}
