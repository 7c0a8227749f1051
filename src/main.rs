//! relay-proxy entry point.
//!
//! Loads configuration, applies CLI overrides, installs logging and metrics,
//! then serves until Ctrl+C or SIGTERM.

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use relay_proxy::config::{load_config, ConfigError, ProxyConfig};
use relay_proxy::http::HttpServer;
use relay_proxy::lifecycle::{shutdown_signal, Shutdown};
use relay_proxy::observability::{logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "relay-proxy", version)]
#[command(about = "HTTP reverse proxy with buffered and streaming forwarding", long_about = None)]
struct Args {
    /// Path to a TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listener address, overrides `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,

    /// Upstream base URI, overrides `upstream.base_uri`.
    #[arg(short, long)]
    upstream: Option<String>,

    /// Upstream pool ceiling, overrides `upstream.max_connections`.
    #[arg(long)]
    max_connections: Option<usize>,
}

impl Args {
    fn load(&self) -> Result<ProxyConfig, ConfigError> {
        load_config(self.config.as_deref(), |config| {
            if let Some(bind) = &self.bind {
                config.listener.bind_address = bind.clone();
            }
            if let Some(upstream) = &self.upstream {
                config.upstream.base_uri = upstream.clone();
            }
            if let Some(max) = self.max_connections {
                config.upstream.max_connections = max;
            }
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = args.load()?;

    logging::init(&config.observability)?;

    tracing::info!("relay-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.base_uri,
        max_connections = config.upstream.max_connections,
        read_timeout_ms = config.timeouts.read_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config)?;

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.trigger();
    });

    server.run(listener, rx).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
