//! The security engine's three independent rules and the worker that runs
//! them against every ingested span.

pub mod anomaly;
pub mod injection;
pub mod pii;
pub mod worker;

pub use worker::SecurityWorker;
