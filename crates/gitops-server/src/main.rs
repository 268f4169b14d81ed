//! GitOps engine operator server
//!
//! Runs the reconciliation engine and exposes it over JSON-RPC 2.0 on stdio.
//!
//! # Usage
//!
//! ```bash
//! gitops-server [--data-dir <path>] [--drift-interval <seconds>]
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Control log verbosity (default: `info` for engine crates)
//!
//! # Protocol
//!
//! - Requests/responses go through stdout, one JSON document per line
//! - Logs go to stderr (to avoid interfering with the protocol)
//!
//! The engine keeps reconciling in the background (revision polling is
//! nudged via `app/refresh`; drift detection runs on its own ticker) while
//! the stdio loop serves operator requests. Closing stdin shuts the engine
//! down cleanly.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use gitops_core::{EngineConfig, LocalCluster, Reconciler};
use gitops_git::GitSourceProvider;
use gitops_server::GitopsServer;

/// GitOps reconciliation engine with a JSON-RPC operator surface
#[derive(Parser)]
#[command(name = "gitops-server")]
#[command(about = "GitOps reconciliation engine with a JSON-RPC operator surface")]
#[command(version)]
struct Args {
    /// Engine state directory (registry, history, baselines)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Seconds between drift detection passes
    #[arg(long, default_value_t = 60)]
    drift_interval: u64,
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("gitops-engine"))
        .unwrap_or_else(|| PathBuf::from(".gitops-engine"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logging goes to stderr; stdout is reserved for the protocol.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gitops_server=info".parse()?)
                .add_directive("gitops_core=info".parse()?)
                .add_directive("gitops_git=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let data_dir = args.data_dir.unwrap_or_else(default_data_dir);

    tracing::info!(
        data_dir = %data_dir.display(),
        drift_interval = args.drift_interval,
        "starting gitops-server"
    );

    let config = EngineConfig::new(&data_dir)
        .with_drift_interval(Duration::from_secs(args.drift_interval));
    let engine = Arc::new(Reconciler::new(
        config,
        Arc::new(GitSourceProvider::new()),
        Arc::new(LocalCluster::new()),
        Arc::new(LocalCluster::new()),
    )?);
    engine.start();

    let server = GitopsServer::new(engine.clone());
    server.run().await?;

    tracing::info!("stdin closed, shutting down");
    engine.shutdown().await;

    Ok(())
}
