//! Dispatch host
//!
//! Serves the echo application through the request dispatch server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ net::tcp (hyper accept loop, RawContext per request)
//!                    │
//!                    ▼
//!                server::dispatcher (one task per request)
//!                    │
//!                    ├─▶ features (request/response features, lifecycle hooks)
//!                    └─▶ app (create → process → dispose)
//!                    │
//!     Client ◀── RawResponse::close (exactly once)
//! ```

use std::path::PathBuf;

use clap::Parser;

use dispatch_host::config::{load_config, validate_config, ConfigError, HostConfig};
use dispatch_host::observability::init_logging;
use dispatch_host::{DispatchServer, EchoApplication, TcpHttpListener};

#[derive(Parser)]
#[command(name = "dispatch-host")]
#[command(about = "Serve the echo application through the request dispatch server", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen prefix, e.g. http://127.0.0.1:8080/. Repeat to listen on several.
    #[arg(short, long = "address")]
    addresses: Vec<String>,

    /// Log level or filter directive, overriding the configuration.
    #[arg(long)]
    log_level: Option<String>,
}

fn resolve_config(cli: &Cli) -> Result<HostConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => HostConfig::default(),
    };

    if !cli.addresses.is_empty() {
        config.server.addresses = cli.addresses.clone();
    }
    if let Some(level) = &cli.log_level {
        config.observability.log_level = level.clone();
    }

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    init_logging(&config.observability)?;

    tracing::info!("dispatch-host v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        addresses = ?config.server.addresses,
        max_connections = config.listener.max_connections,
        max_body_bytes = config.listener.max_body_bytes,
        "Configuration loaded"
    );

    let listener = TcpHttpListener::new(config.listener.clone());
    let mut server = DispatchServer::from_config(listener, &config.server);
    server.start(EchoApplication)?;

    tracing::info!(
        addresses = ?server.listener().local_addrs(),
        "Listening for connections"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    server.stop();
    tracing::info!("Shutdown complete");
    Ok(())
}
