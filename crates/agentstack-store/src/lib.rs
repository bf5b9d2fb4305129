//! SDK-side local fallback persistence and the gateway's analytical
//! columnar store adapter.

pub mod analytical;
pub mod error;
pub mod fallback;

pub use analytical::{AnalyticalStore, CostRow, SecurityAlertRow, SqliteAnalyticalStore};
pub use error::{AnalyticalStoreError, Result};
pub use fallback::FallbackStore;
