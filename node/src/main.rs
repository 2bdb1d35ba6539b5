//! Federated registry node
//!
//! Runs one registry installation: keeps its local catalog in sync with the
//! configured peers and publishes local entries to them.
//!
//! Usage:
//!   fedreg-node --config fedreg.toml --port 8993

use anyhow::{Context, Result};
use clap::Parser;
use fedreg_node::{Node, NodeConfig};
use fedreg_store::SqliteRecordStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fedreg-node")]
#[command(about = "Federated registry node")]
struct Args {
    /// Path to the node configuration file
    #[arg(short, long, default_value = "fedreg.toml")]
    config: PathBuf,

    /// HTTP port, overriding the configuration file
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let mut config = if args.config.exists() {
        info!("Loading configuration from {:?}", args.config);
        NodeConfig::load(&args.config)?
    } else {
        warn!("No configuration at {:?}, using defaults", args.config);
        NodeConfig::default()
    };
    if let Some(port) = args.port {
        config.listen_port = port;
    }

    let local = SqliteRecordStore::open(&config.local_source_id, &config.db_path)
        .with_context(|| format!("Failed to open record store at {}", config.db_path.display()))?;
    let node = Node::start(&config, Arc::new(local)).await?;
    let identity = node
        .identity()
        .registry_id
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default();

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.listen_port))
        .await
        .with_context(|| format!("Failed to bind HTTP port {}", config.listen_port))?;
    info!(
        "Node {} ({}) listening on port {} with {} peer(s)",
        config.federation.node.name,
        identity,
        config.listen_port,
        config.remotes.len()
    );

    axum::serve(listener, node.router())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Shutting down...");
    if !node.shutdown().await {
        warn!("Some publication work was abandoned");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}
