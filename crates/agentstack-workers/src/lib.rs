//! Consumer framework and the three independent `spans.ingest` workers:
//! persistent writer, cost calculator, security engine.

pub mod consumer;
pub mod cost;
pub mod error;
pub mod security;
pub mod writer;

pub use consumer::{Consumer, ConsumerIdentity};
pub use cost::CostWorker;
pub use error::{Result, WorkerError};
pub use security::SecurityWorker;
pub use writer::PersistentWriter;
