//! The mutable in-flight [`Span`] and its immutable post-end projection,
//! [`SpanRecord`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::clock::{duration_ms, monotonic_now, wall_clock_ns, MonotonicInstant};
use crate::ids::new_id;
use crate::redactor;

/// Terminal status of a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpanStatus {
    /// Completed without error.
    Ok,
    /// Completed with an error.
    Error,
}

impl Default for SpanStatus {
    fn default() -> Self {
        Self::Ok
    }
}

/// A single point-in-time occurrence recorded on a span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanEvent {
    /// Event name.
    pub name: String,
    /// Wall-clock epoch nanoseconds.
    pub timestamp: u64,
    /// Event attributes, stringified.
    pub attributes: HashMap<String, String>,
}

/// A mutable, in-flight unit of work.
///
/// Owned by the creating thread/task until [`Span::end`]; afterwards it is
/// handed off (see the crate-level ownership note in the SDK's exporter).
#[derive(Debug, Clone)]
pub struct Span {
    trace_id: String,
    span_id: String,
    parent_span_id: Option<String>,
    name: String,
    service_name: String,
    project_id: String,
    start_wall_ns: u64,
    end_wall_ns: Option<u64>,
    start_mono: MonotonicInstant,
    end_mono: Option<MonotonicInstant>,
    attributes: HashMap<String, String>,
    events: Vec<SpanEvent>,
    status: SpanStatus,
    ended: bool,
}

impl Span {
    /// Start a new span. If `parent` is `None` this span is a trace root and
    /// mints a fresh `trace_id`; otherwise it inherits `trace_id` from the
    /// parent and sets `parent_span_id`.
    #[must_use]
    pub fn start(name: impl Into<String>, service_name: impl Into<String>, parent: Option<&Span>) -> Self {
        let (trace_id, parent_span_id) = match parent {
            Some(p) => (p.trace_id.clone(), Some(p.span_id.clone())),
            None => (new_id(), None),
        };
        Self::new_with_lineage(name, service_name, trace_id, parent_span_id)
    }

    /// Start a new span consulting the context stack's current
    /// [`crate::context::SpanRef`] rather than a full live [`Span`], for
    /// callers (the SDK's tracer) that only ever hold the lightweight
    /// context snapshot. Same root/child contract as [`Span::start`].
    #[must_use]
    pub fn start_from_ref(
        name: impl Into<String>,
        service_name: impl Into<String>,
        parent: Option<&crate::context::SpanRef>,
    ) -> Self {
        let (trace_id, parent_span_id) = match parent {
            Some(p) => (p.trace_id.clone(), Some(p.span_id.clone())),
            None => (new_id(), None),
        };
        Self::new_with_lineage(name, service_name, trace_id, parent_span_id)
    }

    fn new_with_lineage(
        name: impl Into<String>,
        service_name: impl Into<String>,
        trace_id: String,
        parent_span_id: Option<String>,
    ) -> Self {
        Self {
            trace_id,
            span_id: new_id(),
            parent_span_id,
            name: name.into(),
            service_name: service_name.into(),
            project_id: String::new(),
            start_wall_ns: wall_clock_ns(),
            end_wall_ns: None,
            start_mono: monotonic_now(),
            end_mono: None,
            attributes: HashMap::new(),
            events: Vec::new(),
            status: SpanStatus::Ok,
            ended: false,
        }
    }

    /// The span's own id.
    #[must_use]
    pub fn span_id(&self) -> &str {
        &self.span_id
    }

    /// The trace this span belongs to.
    #[must_use]
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Whether `end()` has already been called.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// A lightweight reference to this span, suitable for pushing onto the
    /// context stack.
    #[must_use]
    pub fn as_ref_handle(&self) -> crate::context::SpanRef {
        crate::context::SpanRef {
            trace_id: self.trace_id.clone(),
            span_id: self.span_id.clone(),
        }
    }

    /// Set an attribute. No-op (with a warning) if the span has ended.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl ToString) {
        if self.ended {
            warn!(span_id = %self.span_id, "set_attribute called after end(), ignoring");
            return;
        }
        self.attributes.insert(key.into(), value.to_string());
    }

    /// Set the span's status, optionally recording an error message attribute.
    pub fn set_status(&mut self, status: SpanStatus, message: Option<&str>) {
        if self.ended {
            warn!(span_id = %self.span_id, "set_status called after end(), ignoring");
            return;
        }
        self.status = status;
        if let Some(message) = message {
            self.attributes
                .insert("error.message".to_string(), message.to_string());
        }
    }

    /// Append an event. No-op (with a warning) if the span has ended.
    pub fn add_event(&mut self, name: impl Into<String>, attrs: Option<HashMap<String, String>>) {
        if self.ended {
            warn!(span_id = %self.span_id, "add_event called after end(), ignoring");
            return;
        }
        self.events.push(SpanEvent {
            name: name.into(),
            timestamp: wall_clock_ns(),
            attributes: attrs.unwrap_or_default(),
        });
    }

    /// Record an exception: sets ERROR status, `error.type`/`error.message`
    /// attributes, and appends an `"exception"` event.
    pub fn record_exception(&mut self, error_type: &str, message: &str) {
        if self.ended {
            warn!(span_id = %self.span_id, "record_exception called after end(), ignoring");
            return;
        }
        self.attributes
            .insert("error.type".to_string(), error_type.to_string());
        self.attributes
            .insert("error.message".to_string(), message.to_string());
        self.status = SpanStatus::Error;
        let mut attrs = HashMap::new();
        attrs.insert("error.type".to_string(), error_type.to_string());
        attrs.insert("error.message".to_string(), message.to_string());
        self.events.push(SpanEvent {
            name: "exception".to_string(),
            timestamp: wall_clock_ns(),
            attributes: attrs,
        });
    }

    /// Set the tenancy project id (injected by the gateway on ingest, or set
    /// directly by an SDK configured with a known project).
    pub fn set_project_id(&mut self, project_id: impl Into<String>) {
        self.project_id = project_id.into();
    }

    /// End the span. Idempotent: the second and later calls are no-ops.
    pub fn end(&mut self) {
        if self.ended {
            return;
        }
        self.end_wall_ns = Some(wall_clock_ns());
        self.end_mono = Some(monotonic_now());
        self.ended = true;
    }

    /// Project this span to its immutable, serializable [`SpanRecord`].
    ///
    /// Returns `None` if the span has not been ended — an unended span is
    /// never exported. Attribute and event-attribute values are scrubbed of
    /// PII/secrets on the way out; the live `Span` keeps its raw values for
    /// in-process use until this projection happens.
    #[must_use]
    pub fn to_record(&self) -> Option<SpanRecord> {
        let end_mono = self.end_mono?;
        let end_wall_ns = self.end_wall_ns?;
        Some(SpanRecord {
            trace_id: self.trace_id.clone(),
            span_id: self.span_id.clone(),
            parent_span_id: self.parent_span_id.clone(),
            name: self.name.clone(),
            start_time: self.start_wall_ns,
            end_time: end_wall_ns,
            duration_ms: duration_ms(self.start_mono, end_mono),
            status: self.status,
            service_name: self.service_name.clone(),
            project_id: self.project_id.clone(),
            attributes: scrub_attributes(&self.attributes),
            events: self
                .events
                .iter()
                .map(|e| SpanEvent {
                    name: e.name.clone(),
                    timestamp: e.timestamp,
                    attributes: scrub_attributes(&e.attributes),
                })
                .collect(),
        })
    }
}

/// Immutable, post-end projection of a [`Span`]; the wire/storage shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanRecord {
    /// Trace this span belongs to.
    pub trace_id: String,
    /// This span's id.
    pub span_id: String,
    /// Parent span id, absent for a trace root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    /// Operation label.
    pub name: String,
    /// Epoch nanoseconds at start.
    pub start_time: u64,
    /// Epoch nanoseconds at end.
    pub end_time: u64,
    /// Duration computed from the monotonic clock pair, never from wall time.
    pub duration_ms: u64,
    /// Terminal status.
    pub status: SpanStatus,
    /// Producing service name.
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Tenant/project this span belongs to.
    #[serde(default)]
    pub project_id: String,
    /// String-keyed, string-valued attributes.
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    /// Ordered events.
    #[serde(default)]
    pub events: Vec<SpanEvent>,
}

fn default_service_name() -> String {
    "default".to_string()
}

fn scrub_attributes(attrs: &HashMap<String, String>) -> HashMap<String, String> {
    attrs
        .iter()
        .map(|(k, v)| (k.clone(), redactor::scrub(v).into_owned()))
        .collect()
}
