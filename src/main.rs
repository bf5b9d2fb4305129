//! # AgentStack Collector
//!
//! The ingestion-and-fanout backbone for AI-agent telemetry: an
//! authenticated ingest gateway, three independent consumer-group workers
//! reading the same `spans.ingest` topic, and a live alert broadcaster.
//!
//! ## Usage
//!
//! ```bash
//! # Run gateway, broadcaster, and all three workers in one process
//! agentstack all
//!
//! # Run only the ingest gateway and live broadcaster
//! agentstack serve
//!
//! # Run a single consumer-group worker, deployable independently
//! agentstack worker writer
//! agentstack worker cost
//! agentstack worker security
//!
//! # Override via environment
//! AGENTSTACK_BIND_ADDR=0.0.0.0:9000 AGENTSTACK_STORE_URL=/data/agentstack.db agentstack serve
//! ```
//!
//! Each subcommand maps to one of the original system's independently
//! deployable OS processes (SPEC_FULL.md §2's process topology supplement).
//! `all` is the one this workspace's in-memory `DurableLog` reference
//! adapter actually requires, since it is process-local: a `worker` process
//! started independently from `serve` would see an empty log, not the
//! gateway's. A deployment backed by a real external log swaps that adapter
//! out and the subcommands become independently deployable for real.
//!
//! Packaging and environment plumbing beyond `CollectorConfig`'s own
//! `from_env` are out of this system's scope (spec §1).

mod cli;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use agentstack_config::CollectorConfig;
use agentstack_durablelog::{DurableLog, InMemoryLog};
use agentstack_server::{build_router, run_broadcast_loop, AppState};
use agentstack_store::SqliteAnalyticalStore;
use agentstack_workers::{Consumer, CostWorker, PersistentWriter, SecurityWorker};
use clap::Parser;
use cli::{Cli, Command, WorkerRole};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting agentstack collector");

    let cli = Cli::parse();
    if let Err(error) = run(cli).await {
        error!(%error, "collector failed");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = CollectorConfig::from_env()?;
    info!(bind_addr = %config.bind_addr, "configuration loaded");

    match cli.command {
        Command::Serve => run_serve(config).await,
        Command::Worker { role } => run_worker(config, role).await,
        Command::All => run_all(config).await,
    }
}

/// The durable log and analytical store are external services per the
/// scope boundary (spec §1); every subcommand wires in-process reference
/// adapters so the pipeline is runnable standalone.
async fn open_store(config: &CollectorConfig) -> Result<Arc<SqliteAnalyticalStore>, Box<dyn std::error::Error>> {
    Ok(Arc::new(SqliteAnalyticalStore::open(&config.store_url).await?))
}

/// `agentstack serve`: the ingest gateway and live broadcaster only, no
/// consumer workers.
async fn run_serve(config: CollectorConfig) -> Result<(), Box<dyn std::error::Error>> {
    let log: Arc<dyn DurableLog> = Arc::new(InMemoryLog::new());
    let state = AppState::new(config.clone(), Arc::clone(&log));
    tokio::spawn(run_broadcast_loop(Arc::clone(&log), Arc::clone(&state.broadcaster)));
    serve_router(config, state).await
}

/// `agentstack worker <role>`: a single consumer-group worker, run until a
/// shutdown signal arrives.
async fn run_worker(config: CollectorConfig, role: WorkerRole) -> Result<(), Box<dyn std::error::Error>> {
    let log: Arc<dyn DurableLog> = Arc::new(InMemoryLog::new());
    let store = open_store(&config).await?;
    let stop = Arc::new(AtomicBool::new(false));

    let handle = match role {
        WorkerRole::Writer => {
            let writer = PersistentWriter::new("writer-1", store);
            let log = Arc::clone(&log);
            let stop = Arc::clone(&stop);
            tokio::spawn(async move { writer.run(log, stop).await })
        }
        WorkerRole::Cost => {
            let cost = CostWorker::new("cost-1", store);
            let log = Arc::clone(&log);
            let stop = Arc::clone(&stop);
            tokio::spawn(async move { cost.run(log, stop).await })
        }
        WorkerRole::Security => {
            let security = SecurityWorker::new("security-1", store, Arc::clone(&log));
            let stop = Arc::clone(&stop);
            tokio::spawn(async move { security.run(log, stop).await })
        }
    };

    shutdown_signal().await;
    stop.store(true, Ordering::Relaxed);
    match handle.await {
        Ok(Err(error)) => error!(%error, "worker exited with error"),
        Err(join_error) => error!(%join_error, "worker task panicked"),
        Ok(Ok(())) => {}
    }
    Ok(())
}

/// `agentstack all`: gateway, broadcaster, and all three workers in one
/// process, sharing one in-memory log instance.
async fn run_all(config: CollectorConfig) -> Result<(), Box<dyn std::error::Error>> {
    let log: Arc<dyn DurableLog> = Arc::new(InMemoryLog::new());
    let store = open_store(&config).await?;

    let stop = Arc::new(AtomicBool::new(false));
    spawn_workers(Arc::clone(&log), store, Arc::clone(&stop));

    let state = AppState::new(config.clone(), Arc::clone(&log));
    tokio::spawn(run_broadcast_loop(Arc::clone(&log), Arc::clone(&state.broadcaster)));

    serve_router(config, state).await?;
    stop.store(true, Ordering::Relaxed);
    Ok(())
}

/// Binds and serves the gateway/broadcaster router until a shutdown signal
/// arrives, shared by `serve` and `all`.
async fn serve_router(config: CollectorConfig, state: AppState) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_router(state);
    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "ingest gateway and live broadcaster listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Spawns the three independent consumer-group workers (§4.10-4.12), each on
/// its own task, all reading `spans.ingest` under distinct groups so they
/// see every span without contending with each other.
fn spawn_workers(log: Arc<dyn DurableLog>, store: Arc<SqliteAnalyticalStore>, stop: Arc<AtomicBool>) {
    let writer = PersistentWriter::new("writer-1", store.clone());
    let writer_log = Arc::clone(&log);
    let writer_stop = Arc::clone(&stop);
    tokio::spawn(async move {
        if let Err(error) = writer.run(writer_log, writer_stop).await {
            error!(%error, "persistent writer exited");
        }
    });

    let cost = CostWorker::new("cost-1", store.clone());
    let cost_log = Arc::clone(&log);
    let cost_stop = Arc::clone(&stop);
    tokio::spawn(async move {
        if let Err(error) = cost.run(cost_log, cost_stop).await {
            error!(%error, "cost worker exited");
        }
    });

    let security = SecurityWorker::new("security-1", store, Arc::clone(&log));
    tokio::spawn(async move {
        if let Err(error) = security.run(log, stop).await {
            error!(%error, "security worker exited");
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received, draining");
}
