//! Sanitisation of the offending-data excerpt attached to a failure record.

use serde_json::Value;

use crate::redaction::redact_sensitive_fields;

/// Maximum number of elements kept from any array in a sample.
pub const MAX_SAMPLE_ITEMS: usize = 2;

/// Maximum number of characters kept from a string nested in a sample.
pub const MAX_SAMPLE_STRING_CHARS: usize = 500;

/// Produce a redacted, size-capped copy of `sample`.
///
/// Sensitive keys are masked by [`redact_sensitive_fields`], which also
/// bounds the nesting depth. Then, inside any object or array:
///
/// - arrays keep their first [`MAX_SAMPLE_ITEMS`] elements,
/// - strings longer than [`MAX_SAMPLE_STRING_CHARS`] are cut and suffixed with `…`.
///
/// A sample that is not an object or array passes through unchanged.
pub fn sanitize_sample(sample: &Value) -> Value {
    match sample {
        Value::Object(_) | Value::Array(_) => cap_nested(redact_sensitive_fields(sample)),
        scalar => scalar.clone(),
    }
}

fn cap_nested(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .take(MAX_SAMPLE_ITEMS)
                .map(cap_nested)
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, val)| (key, cap_nested(val)))
                .collect(),
        ),
        Value::String(s) => Value::String(truncate_chars(&s, MAX_SAMPLE_STRING_CHARS)),
        scalar => scalar,
    }
}

/// Cut `s` to at most `max_chars` characters, marking the cut with `…`.
pub(crate) fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}…", &s[..byte_idx]),
        None => s.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redaction::{MAX_REDACTION_DEPTH, REDACTION_MARKER};
    use serde_json::json;

    #[test]
    fn caps_arrays_to_two_rows() {
        let sample = json!([{"sku": "A"}, {"sku": "B"}, {"sku": "C"}, {"sku": "D"}]);
        let clean = sanitize_sample(&sample);
        assert_eq!(clean, json!([{"sku": "A"}, {"sku": "B"}]));
    }

    #[test]
    fn redacts_sensitive_keys_inside_rows() {
        let sample = json!([{"sku": "A", "apiToken": "abc"}]);
        let clean = sanitize_sample(&sample);
        assert_eq!(clean[0]["apiToken"], "[REDACTED]");
        assert_eq!(clean[0]["sku"], "A");
    }

    #[test]
    fn redacts_nested_objects() {
        let sample = json!({"supplier": {"name": "Acme", "password": "pw"}});
        let clean = sanitize_sample(&sample);
        assert_eq!(clean["supplier"]["password"], REDACTION_MARKER);
        assert_eq!(clean["supplier"]["name"], "Acme");
    }

    #[test]
    fn scalars_pass_through() {
        assert_eq!(sanitize_sample(&json!(42)), json!(42));
        assert_eq!(sanitize_sample(&json!(true)), json!(true));
        assert_eq!(sanitize_sample(&Value::Null), Value::Null);
        assert_eq!(sanitize_sample(&json!("row 17")), json!("row 17"));
    }

    #[test]
    fn long_top_level_string_passes_through() {
        let raw = json!("x".repeat(MAX_SAMPLE_STRING_CHARS + 100));
        assert_eq!(sanitize_sample(&raw), raw);
    }

    #[test]
    fn long_nested_strings_are_truncated() {
        let long = "é".repeat(MAX_SAMPLE_STRING_CHARS + 10);
        let clean = sanitize_sample(&json!({"note": long, "tags": [long]}));
        for s in [&clean["note"], &clean["tags"][0]] {
            let s = s.as_str().unwrap_or_default();
            assert_eq!(s.chars().count(), MAX_SAMPLE_STRING_CHARS + 1);
            assert!(s.ends_with('…'));
        }
    }

    #[test]
    fn nested_string_at_limit_is_kept_whole() {
        let exact = "x".repeat(MAX_SAMPLE_STRING_CHARS);
        let sample = json!({"note": exact});
        assert_eq!(sanitize_sample(&sample), sample);
    }

    #[test]
    fn deeply_nested_sample_is_bounded() {
        let mut sample = json!({"sku": "A"});
        for _ in 0..1_000 {
            sample = json!({"child": sample});
        }
        let mut clean = &sanitize_sample(&sample);
        let mut levels = 0;
        while let Some(child) = clean.get("child") {
            clean = child;
            levels += 1;
        }
        assert_eq!(levels, MAX_REDACTION_DEPTH);
        assert_eq!(*clean, json!(REDACTION_MARKER));
    }

    #[test]
    fn truncate_counts_characters_not_bytes() {
        assert_eq!(truncate_chars("ééé", 2), "éé…");
        assert_eq!(truncate_chars("ab", 2), "ab");
    }
}
