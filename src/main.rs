//! woodland static file and routing server.
//!
//! ```text
//!   Client ──▶ HttpServer (axum) ──▶ Router::dispatch ──▶ middleware chain
//!                                         │                     │
//!                                         ▼                     ▼
//!                               RouteResolver cache       StaticFiles
//!                               PermissionResolver        (files.root)
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use woodland::config::{load_config, ServerConfig};
use woodland::observability::{logging, metrics};
use woodland::{HttpServer, Router, Shutdown};

#[derive(Debug, Parser)]
#[command(name = "woodland", version, about = "HTTP router and static file server")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };

    logging::init(&config.router.logging.level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "woodland starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        files_enabled = config.files.enabled,
        files_root = %config.files.root,
        cache_size = config.router.cache_size,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let mut router = Router::new(config.router.clone());
    if config.files.enabled {
        router.files(&config.files.prefix, &config.files.root)?;
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    shutdown.trigger_on_ctrl_c();

    HttpServer::new(router).run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
