//! CLI surface for the `agentstack` binary's per-role subcommands.
//!
//! Grounded on `gateway-cli/src/cli.rs`'s `Parser`/`Subcommand` derive
//! shape, narrowed to the roles this pipeline actually has. Each subcommand
//! maps to one of the original's independently-deployable OS processes
//! (spec §2): the ingest gateway, the live broadcaster, and each of the
//! three `spans.ingest` consumer workers. `all` collapses them into the
//! single process this workspace's in-memory reference adapters actually
//! require to share state (see `DESIGN.md`).

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "agentstack")]
#[command(author, version, about = "Observability pipeline for AI-agent workloads")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the ingest gateway and live broadcaster (`POST /v1/traces`,
    /// `GET /ws/traces`) without any consumer worker.
    Serve,
    /// Run one of the independent `spans.ingest` consumer workers.
    Worker {
        #[command(subcommand)]
        role: WorkerRole,
    },
    /// Run the gateway, the live broadcaster, and all three workers
    /// together in this one process.
    All,
}

#[derive(Subcommand, Debug)]
pub enum WorkerRole {
    /// Bulk-writes every ingested span to the analytical store (group `writer`).
    Writer,
    /// Prices LLM usage and writes `cost_metrics` rows (group `cost`).
    Cost,
    /// Runs the injection/PII/anomaly rules against every span (group `security`).
    Security,
}
