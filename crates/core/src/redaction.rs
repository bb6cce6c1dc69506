//! Redaction of credential-looking fields in free-form JSON.
//!
//! Used wherever user-supplied data is about to be logged or persisted
//! (import failure samples, diagnostics reports).

use serde_json::{Map, Value};

/// Substrings that mark a key as sensitive. Matching is case-insensitive.
pub const SENSITIVE_KEY_PARTS: &[&str] = &["password", "token", "key", "secret"];

/// Replacement written in place of a sensitive value.
pub const REDACTION_MARKER: &str = "[REDACTED]";

/// Deepest container nesting that is walked. Anything below this level
/// cannot be inspected for sensitive keys and is replaced wholesale.
pub const MAX_REDACTION_DEPTH: usize = 32;

/// Whether `key` names a field whose value must never be stored.
pub fn is_sensitive_key(key: &str) -> bool {
    let lower_key = key.to_lowercase();
    SENSITIVE_KEY_PARTS.iter().any(|part| lower_key.contains(part))
}

/// Copy `value` with every sensitive field replaced by [`REDACTION_MARKER`].
///
/// Scalars at the top level come back unchanged. Containers nested deeper
/// than [`MAX_REDACTION_DEPTH`] are replaced by the marker, so the output
/// depth is bounded whatever the input.
pub fn redact_sensitive_fields(value: &Value) -> Value {
    redact_at(value, 0)
}

fn redact_at(value: &Value, depth: usize) -> Value {
    let is_container = matches!(value, Value::Object(_) | Value::Array(_));
    if is_container && depth >= MAX_REDACTION_DEPTH {
        return Value::String(REDACTION_MARKER.to_string());
    }

    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, val)| {
                    let val = if is_sensitive_key(key) {
                        Value::String(REDACTION_MARKER.to_string())
                    } else {
                        redact_at(val, depth + 1)
                    };
                    (key.clone(), val)
                })
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => {
            Value::Array(items.iter().map(|item| redact_at(item, depth + 1)).collect())
        }
        scalar => scalar.clone(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
