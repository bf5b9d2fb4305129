//! Per-span schema validation.
//!
//! Grounded on `original_source/.../validators.py::validate_span`, the
//! function the ingest handler (`server.py`) actually calls on the hot
//! path — not the Pydantic `SpanPayload` model defined alongside it, which
//! is never invoked on ingest. `validate_span` requires exactly
//! `span_id, trace_id, name, start_time, end_time`; `duration_ms` is not
//! among them and is defaulted (computed from `start_time`/`end_time`) when
//! absent, matching spec §4.6 step 4's required-field list. Reproduced here
//! with `serde_json::Value` inspection rather than the teacher's `validator`
//! crate derive macros, since a span's checks are cross-field (numeric
//! types, required-field presence before defaulting) rather than simple
//! per-field constraints — following `gateway-server/src/handlers.rs`'s
//! idiom of hand-rolled validation feeding an explicit error type.

use serde_json::Value;

/// Why a span was rejected. Carried only for the warning log line; rejected
/// spans are dropped, never surfaced to the caller.
#[derive(Debug)]
pub struct ValidationError(pub String);

const REQUIRED_STRING_FIELDS: &[&str] = &["span_id", "trace_id", "name"];
const REQUIRED_INT_FIELDS: &[&str] = &["start_time", "end_time"];

/// Validate `span` against the documented schema, filling in default values
/// for the fields the schema marks optional (`status`, `service_name`,
/// `attributes`, `events`, `duration_ms`) in place.
///
/// # Errors
/// Returns [`ValidationError`] naming the first missing/malformed field.
pub fn validate_and_normalize(span: &mut Value) -> Result<(), ValidationError> {
    let object = span
        .as_object_mut()
        .ok_or_else(|| ValidationError("span is not a JSON object".to_string()))?;

    for field in REQUIRED_STRING_FIELDS {
        match object.get(*field).and_then(Value::as_str) {
            Some(s) if !s.is_empty() => {}
            _ => return Err(ValidationError(format!("missing or empty field {field}"))),
        }
    }

    for field in REQUIRED_INT_FIELDS {
        match object.get(*field) {
            Some(v) if v.is_i64() || v.is_u64() => {}
            _ => return Err(ValidationError(format!("missing or non-numeric field {field}"))),
        }
    }

    object
        .entry("status")
        .or_insert_with(|| Value::String("OK".to_string()));
    object
        .entry("service_name")
        .or_insert_with(|| Value::String("default".to_string()));
    object
        .entry("attributes")
        .or_insert_with(|| Value::Object(serde_json::Map::new()));
    object
        .entry("events")
        .or_insert_with(|| Value::Array(Vec::new()));

    let needs_default_duration = !matches!(object.get("duration_ms"), Some(v) if v.is_i64() || v.is_u64());
    if needs_default_duration {
        let start_time = object.get("start_time").and_then(Value::as_i64).unwrap_or(0);
        let end_time = object.get("end_time").and_then(Value::as_i64).unwrap_or(0);
        let duration_ms = end_time.saturating_sub(start_time).max(0) / 1_000_000;
        object.insert("duration_ms".to_string(), Value::from(duration_ms));
    }

    Ok(())
}

/// Inject the authenticated `project_id` into an already-validated span.
pub fn inject_project_id(span: &mut Value, project_id: &str) {
    if let Some(object) = span.as_object_mut() {
        object.insert("project_id".to_string(), Value::String(project_id.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_minimal_span_and_fills_defaults() {
        let mut span = json!({
            "span_id": "s1", "trace_id": "t1", "name": "op",
            "start_time": 0, "end_time": 100,
        });
        validate_and_normalize(&mut span).unwrap();
        assert_eq!(span["status"], "OK");
        assert_eq!(span["service_name"], "default");
        assert_eq!(span["attributes"], json!({}));
        assert_eq!(span["events"], json!([]));
    }

    #[test]
    fn missing_duration_ms_is_accepted_and_defaulted() {
        let mut span = json!({
            "span_id": "s1", "trace_id": "t1", "name": "op",
            "start_time": 0, "end_time": 5_000_000,
        });
        validate_and_normalize(&mut span).unwrap();
        assert_eq!(span["duration_ms"], 5);
    }

    #[test]
    fn rejects_missing_span_id() {
        let mut span = json!({
            "trace_id": "t1", "name": "op", "start_time": 0, "end_time": 100, "duration_ms": 100,
        });
        assert!(validate_and_normalize(&mut span).is_err());
    }

    #[test]
    fn rejects_non_numeric_start_time() {
        let mut span = json!({
            "span_id": "s1", "trace_id": "t1", "name": "op",
            "start_time": "not-a-number", "end_time": 100, "duration_ms": 100,
        });
        assert!(validate_and_normalize(&mut span).is_err());
    }

    #[test]
    fn rejects_non_object_value() {
        let mut span = json!("not an object");
        assert!(validate_and_normalize(&mut span).is_err());
    }

    #[test]
    fn preserves_explicit_optional_fields() {
        let mut span = json!({
            "span_id": "s1", "trace_id": "t1", "name": "op",
            "start_time": 0, "end_time": 100, "duration_ms": 100,
            "status": "ERROR", "service_name": "my-svc",
        });
        validate_and_normalize(&mut span).unwrap();
        assert_eq!(span["status"], "ERROR");
        assert_eq!(span["service_name"], "my-svc");
    }

    #[test]
    fn preserves_explicit_duration_ms() {
        let mut span = json!({
            "span_id": "s1", "trace_id": "t1", "name": "op",
            "start_time": 0, "end_time": 5_000_000, "duration_ms": 42,
        });
        validate_and_normalize(&mut span).unwrap();
        assert_eq!(span["duration_ms"], 42);
    }

    #[test]
    fn injects_project_id() {
        let mut span = json!({"span_id": "s1"});
        inject_project_id(&mut span, "proj-1");
        assert_eq!(span["project_id"], "proj-1");
    }
}
