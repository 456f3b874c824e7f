use clap::Parser;
use serial_bridge::config;
use serial_bridge::engine::Engine;
use serial_bridge::mcp;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Protocol-agnostic serial bridge exposing MCP tools over stdio.
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Serial-port I/O engine with an MCP tool surface for LLM agents",
    long_about = "Bridges an MCP tool client to a single serial device without assuming any \
                  device protocol. Synchronous command responses and unsolicited device \
                  messages are demultiplexed into separate streams."
)]
struct Args {
    /// Path to a configuration file (default: standard resolution order).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured log level (trace|debug|info|warn|error).
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => config::load_from(path)?,
        None => config::load()?,
    };

    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    // stdout carries the MCP transport; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("serial_bridge={level}"))),
        )
        .with_writer(std::io::stderr)
        .init();

    let engine = Arc::new(Engine::new(config));
    info!(version = env!("CARGO_PKG_VERSION"), "serial-bridge starting");

    let server_engine = engine.clone();
    tokio::select! {
        result = mcp::serve_stdio(server_engine) => {
            if let Err(e) = result {
                error!(error = %e, "MCP server terminated");
            }
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received");
        }
    }

    // Reader termination and descriptor release on every exit path.
    engine.disconnect();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
