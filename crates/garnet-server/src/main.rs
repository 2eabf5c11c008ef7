use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

use garnet_server::config::Config;
use garnet_server::server;
use garnet_server::state::AppState;

/// An in-memory key/value store speaking a textual line protocol.
#[derive(Parser)]
#[command(name = "garnet-server", version)]
struct Args {
    /// Path to the configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured listen port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match Config::load(path) {
            Ok(config) => {
                info!("loaded config from {}", path.display());
                config
            }
            Err(e) => {
                error!("cannot load config {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };
    if let Some(port) = args.port {
        config.port = port;
    }

    let state = AppState::new(config);
    server::bootstrap(&state).await;

    if let Err(e) = server::run(&state).await {
        error!("server error: {e}");
        std::process::exit(1);
    }
}
