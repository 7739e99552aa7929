//! streampoold — the streampool daemon.
//!
//! Single binary that assembles the orchestration subsystems:
//! - Assignment store (redb)
//! - Pool/job lifecycle orchestrator
//! - Autoscaler with downscale debounce
//! - Bus command worker
//! - REST API
//!
//! # Usage
//!
//! ```text
//! streampoold standalone --port 8080 --data-dir /var/lib/streampool --config streampool.toml
//! ```
//!
//! Standalone mode runs against the in-memory batch provider so the full
//! deployment pipeline can be exercised without a cloud account.

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use streampool_api::ApiState;
use streampool_batch::{BatchProvider, InMemoryBatch};
use streampool_bus::{BusWorker, InMemoryBus};
use streampool_deploy::Orchestrator;
use streampool_state::AssignmentStore;

use crate::config::DaemonConfig;

#[derive(Parser)]
#[command(name = "streampoold", about = "streampool daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run in standalone mode (single node, in-memory batch provider).
    Standalone {
        /// Port to listen on.
        #[arg(long, default_value = "8080")]
        port: u16,

        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/streampool")]
        data_dir: PathBuf,

        /// Optional TOML configuration file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Bus poll interval in seconds.
        #[arg(long, default_value = "5")]
        bus_interval: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,streampoold=debug,streampool=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Standalone {
            port,
            data_dir,
            config,
            bus_interval,
        } => run_standalone(port, data_dir, config.as_deref(), bus_interval).await,
    }
}

async fn run_standalone(
    port: u16,
    data_dir: PathBuf,
    config_path: Option<&std::path::Path>,
    bus_interval: u64,
) -> anyhow::Result<()> {
    info!("streampool daemon starting in standalone mode");

    let config = DaemonConfig::load(config_path)?;
    if !config.batch_account_name.is_empty() {
        info!(
            account = %config.batch_account_name,
            url = %config.batch_account_url,
            "batch account configured; standalone mode uses the in-memory provider"
        );
    }

    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("streampool.redb");

    // ── Initialize subsystems ──────────────────────────────────

    let assignments = AssignmentStore::open(&db_path)?;
    info!(path = ?db_path, "assignment store opened");

    let provider: Arc<dyn BatchProvider> = Arc::new(InMemoryBatch::new());
    info!("in-memory batch provider initialized");

    let orchestrator = Arc::new(
        Orchestrator::new(Arc::clone(&provider)).with_assignments(assignments),
    );
    info!("lifecycle orchestrator initialized");

    let defaults = config.deployment_defaults();
    let scaling = config.scaling();
    info!(
        enabled = scaling.enabled(),
        up = scaling.up_threshold,
        down = scaling.down_threshold,
        "autoscaler initialized"
    );
    let state = ApiState::assemble(provider, Arc::clone(&orchestrator), scaling, defaults.clone());

    let bus = Arc::new(InMemoryBus::new());
    let worker = BusWorker::new(bus, orchestrator, defaults, "deployments", "streampoold");
    worker.ensure_entities().await?;
    info!(interval = bus_interval, "bus worker initialized");

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let worker_handle = tokio::spawn(async move {
        worker
            .run(Duration::from_secs(bus_interval), shutdown_rx)
            .await;
    });

    // ── Start API server ───────────────────────────────────────

    let router = streampool_api::build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
        }
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    let _ = worker_handle.await;

    info!("streampool daemon stopped");
    Ok(())
}
