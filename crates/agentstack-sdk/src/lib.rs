//! Client SDK core: span/context (re-exported from `agentstack-core`), the
//! gzip HTTP transport, the local fallback store adapter, and the background
//! batch exporter that ties them together.
//!
//! Per the design notes, global state (tracer/processor singletons in the
//! original) is re-architected as an explicit [`AgentStack`] runtime handle
//! threaded through constructors, with a convenience "default runtime"
//! ([`init`]/[`current`]) initialized from the environment for the
//! decorator-style ergonomic path. "Reset" is handle replacement, not
//! mutation of shared global state.

pub mod error;
pub mod exporter;
pub mod queue;
pub mod tracer;
pub mod transport;

use std::sync::{Arc, OnceLock};

use agentstack_config::SdkConfig;
use agentstack_store::FallbackStore;

pub use agentstack_core::{context, Span, SpanEvent, SpanRecord, SpanStatus};
pub use error::{Result, SdkError};
pub use exporter::{BatchExporter, ExporterConfig, ExporterHandle};
pub use queue::ExportQueue;
pub use tracer::Tracer;
pub use transport::{SendOutcome, Transport};

/// A fully wired SDK runtime: a [`Tracer`] plus its background exporter.
/// Dropping this without calling [`AgentStack::shutdown`] leaves the
/// exporter task running detached (spans already buffered will still be
/// flushed on its own schedule); call `shutdown` for an orderly drain.
pub struct AgentStack {
    tracer: Arc<Tracer>,
    exporter: Option<ExporterHandle>,
}

impl AgentStack {
    /// Wire a tracer and exporter from an explicit [`SdkConfig`]. When
    /// `config.enabled` is `false`, spans are still created (so user code is
    /// never affected) but the exporter is not spawned and ended spans are
    /// simply dropped at the queue once it fills, matching "the SDK no-ops".
    #[must_use]
    pub fn new(config: &SdkConfig, fallback: Option<Arc<FallbackStore>>) -> Self {
        let exporter_config = ExporterConfig::from(config);
        let queue = ExportQueue::new(exporter_config.queue_capacity, exporter_config.batch_size);
        let tracer = Arc::new(Tracer::new(config.service_name.clone(), Arc::clone(&queue)));

        let exporter = if config.enabled {
            let transport = Some(Arc::new(Transport::new(
                config.collector_url.clone(),
                config.api_key_value(),
            )));
            Some(BatchExporter::spawn(queue, transport, fallback, exporter_config))
        } else {
            None
        };

        Self { tracer, exporter }
    }

    /// Load [`SdkConfig`] from the environment and wire a runtime from it,
    /// opening the fallback store at the configured path.
    ///
    /// # Errors
    /// Returns [`SdkError`] if the configuration is invalid or the fallback
    /// store cannot be opened.
    pub async fn from_env() -> Result<Self> {
        let config = SdkConfig::from_env()?;
        let fallback = Arc::new(FallbackStore::open(".agentstack.db").await?);
        Ok(Self::new(&config, Some(fallback)))
    }

    /// The tracer for creating and ending spans.
    #[must_use]
    pub fn tracer(&self) -> Arc<Tracer> {
        Arc::clone(&self.tracer)
    }

    /// Wake the exporter immediately instead of waiting for its interval.
    /// A no-op when the SDK is disabled (no exporter running).
    pub fn flush(&self) {
        if let Some(exporter) = &self.exporter {
            exporter.flush();
        }
    }

    /// Drain and stop the exporter, joining with a bounded wait. A no-op
    /// when the SDK is disabled.
    pub async fn shutdown(self) {
        if let Some(exporter) = self.exporter {
            exporter.shutdown(None).await;
        }
    }
}

trait ApiKeyValue {
    fn api_key_value(&self) -> String;
}

impl ApiKeyValue for SdkConfig {
    fn api_key_value(&self) -> String {
        use secrecy::ExposeSecret;
        self.api_key.expose_secret().to_string()
    }
}

static DEFAULT_RUNTIME: OnceLock<AgentStack> = OnceLock::new();

/// Initialize the process-wide default runtime from the environment, for
/// the decorator's ergonomic path (`#[traced]`-style call sites that have no
/// explicit [`AgentStack`] handle to thread through). Calling this more than
/// once is a no-op after the first success; callers that need a fresh
/// runtime (tests) should build an explicit [`AgentStack`] instead.
///
/// # Errors
/// Returns [`SdkError`] if configuration loading or store initialization
/// fails on the first call. Subsequent calls always succeed (they observe
/// the already-initialized runtime).
pub async fn init() -> Result<()> {
    if DEFAULT_RUNTIME.get().is_some() {
        return Ok(());
    }
    let runtime = AgentStack::from_env().await?;
    let _ = DEFAULT_RUNTIME.set(runtime);
    Ok(())
}

/// The process-wide default runtime's tracer, if [`init`] has been called.
/// Framework adapters and the decorator wrapper use this to avoid requiring
/// every instrumented call site to carry an explicit handle.
#[must_use]
pub fn current() -> Option<Arc<Tracer>> {
    DEFAULT_RUNTIME.get().map(AgentStack::tracer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_runtime_creates_spans_without_exporting() {
        let config = SdkConfig::builder().enabled(false).build().unwrap();
        let stack = AgentStack::new(&config, None);
        let tracer = stack.tracer();
        let span = tracer.start_span("op");
        tracer.end_span(span);
        stack.shutdown().await;
    }
}
