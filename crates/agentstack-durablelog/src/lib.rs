//! The durable log abstraction shared by the ingest gateway, the consumer
//! workers, and the live broadcaster.

pub mod entry;
pub mod error;
pub mod memory;
pub mod trait_def;

pub use entry::LogEntry;
pub use error::{DurableLogError, Result};
pub use memory::InMemoryLog;
pub use trait_def::DurableLog;
