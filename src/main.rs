use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use turnstile::admission::AdmissionGate;
use turnstile::config::TurnstileConfig;
use turnstile::http::HttpServer;

#[derive(Parser, Debug)]
#[command(name = "turnstile")]
#[command(about = "Sliding-window admission control service")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Override the configured listen address
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();

    info!("Starting Turnstile Admission Control Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = match &args.config {
        Some(path) => TurnstileConfig::from_file(path)?,
        None => TurnstileConfig::default(),
    };
    let addr = args.listen.unwrap_or(config.server.http_addr);

    let rules = config.load_rules()?;
    if rules.is_empty() {
        warn!("No admission rules configured; every request will be admitted");
    }
    info!(http_addr = %addr, rules = rules.rules.len(), "Configuration loaded");

    // Initialize the admission gate and its eviction sweeper
    let gate = Arc::new(
        AdmissionGate::new(rules)
            .with_idle_eviction(Duration::from_secs(config.admission.idle_eviction_secs)),
    );
    tokio::spawn(
        Arc::clone(&gate).run_sweeper(Duration::from_secs(config.admission.sweep_interval_secs)),
    );
    info!("Admission gate initialized");

    // Run the server with graceful shutdown on Ctrl+C / SIGTERM
    let server = HttpServer::new(addr, gate);
    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Turnstile Admission Control Service stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
