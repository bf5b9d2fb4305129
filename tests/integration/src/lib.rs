//! End-to-end tests for the AgentStack telemetry pipeline: ingest gateway,
//! consumer workers, and the live broadcaster wired together the way the
//! real binary wires them (see `src/main.rs`), exercising the literal
//! scenarios from spec §8.

pub mod helpers;

#[cfg(test)]
mod e2e;
