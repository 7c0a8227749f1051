//! Stand-in upstream for local benchmarking.
//!
//! Answers every path with `200 OK` and body `OK\n`.

use std::net::SocketAddr;

use axum::Router;
use clap::Parser;

#[derive(Parser)]
#[command(name = "demo-upstream")]
#[command(about = "Fixed-response upstream for exercising relay-proxy", long_about = None)]
struct Args {
    /// Address to listen on.
    #[arg(short, long, default_value = "127.0.0.1:8081")]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let app = Router::new().fallback(|| async { "OK\n" });

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    tracing::info!(address = %listener.local_addr()?, "Demo upstream listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(relay_proxy::lifecycle::shutdown_signal())
        .await?;
    Ok(())
}
