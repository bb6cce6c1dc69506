//! Classification of batch failures into a closed set of error kinds.
//!
//! Matching is case-insensitive substring search over the error message and
//! code. Kinds are tried in a fixed priority order and the first match wins,
//! so "connection timeout" is a timeout and not a network failure.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Match tables
// ---------------------------------------------------------------------------

const TIMEOUT_PHRASES: &[&str] = &[
    "timeout",
    "timed out",
    "time out",
    "request timeout",
    "connection timeout",
    "statement timeout",
];

/// HTTP 408/504 and PostgreSQL `query_canceled` (raised by `statement_timeout`).
const TIMEOUT_CODES: &[&str] = &["408", "504", "57014"];

const CONSTRAINT_PHRASES: &[&str] = &[
    "duplicate key",
    "unique constraint",
    "already exists",
    "violates",
    "foreign key",
];

/// PostgreSQL `unique_violation` and `foreign_key_violation`.
const CONSTRAINT_CODES: &[&str] = &["23505", "23503"];

const NETWORK_PHRASES: &[&str] = &["network", "connection", "refused", "unreachable", "dns"];

const MEMORY_PHRASES: &[&str] = &["memory", "out of memory", "heap", "allocation"];

/// PostgreSQL `out_of_memory`.
const MEMORY_CODES: &[&str] = &["53200"];

const VALIDATION_PHRASES: &[&str] = &[
    "invalid",
    "validation",
    "not null",
    "check constraint",
    "data type",
];

/// PostgreSQL `not_null_violation` and `check_violation`.
const VALIDATION_CODES: &[&str] = &["23502", "23514"];

/// SQLSTATE class for `data_exception` (`22xxx`).
const DATA_EXCEPTION_CLASS: &str = "22";

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Category assigned to every failed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    Constraint,
    Network,
    Validation,
    Memory,
    Unknown,
}

impl ErrorKind {
    /// All kinds, in classification priority order with `Unknown` last.
    pub const ALL: [ErrorKind; 6] = [
        ErrorKind::Timeout,
        ErrorKind::Constraint,
        ErrorKind::Network,
        ErrorKind::Memory,
        ErrorKind::Validation,
        ErrorKind::Unknown,
    ];

    /// String representation for storage and logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::Constraint => "constraint",
            ErrorKind::Network => "network",
            ErrorKind::Validation => "validation",
            ErrorKind::Memory => "memory",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Parse from a string, defaulting to `Unknown` for unrecognised values.
    pub fn from_str(s: &str) -> Self {
        match s {
            "timeout" => ErrorKind::Timeout,
            "constraint" => ErrorKind::Constraint,
            "network" => ErrorKind::Network,
            "validation" => ErrorKind::Validation,
            "memory" => ErrorKind::Memory,
            _ => ErrorKind::Unknown,
        }
    }
}

// ---------------------------------------------------------------------------
// ErrorDetails
// ---------------------------------------------------------------------------

/// The loosely-structured error reported by the upload driver.
///
/// Every field is optional; an empty value is valid input and classifies
/// as [`ErrorKind::Unknown`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub message: Option<String>,
    pub code: Option<String>,
    pub stack: Option<String>,
}

impl ErrorDetails {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Extract details from an arbitrary JSON error payload.
    ///
    /// Non-object input yields empty details. Scalar `message`/`code` values
    /// that are not strings (e.g. numeric status codes) are stringified;
    /// nested objects and arrays are ignored.
    pub fn from_json(value: &serde_json::Value) -> Self {
        let serde_json::Value::Object(map) = value else {
            return Self::default();
        };
        Self {
            message: map.get("message").and_then(scalar_to_string),
            code: map.get("code").and_then(scalar_to_string),
            stack: map.get("stack").and_then(scalar_to_string),
        }
    }

    /// Build details from a Rust error, flattening its `source()` chain into
    /// the stack field.
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        Self {
            message: Some(error.to_string()),
            code: None,
            stack: if causes.is_empty() {
                None
            } else {
                Some(format!("caused by: {}", causes.join("\ncaused by: ")))
            },
        }
    }
}

fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Classify an error into exactly one [`ErrorKind`].
pub fn classify(error: &ErrorDetails) -> ErrorKind {
    let message = error.message.as_deref().unwrap_or_default().to_lowercase();
    let code = error.code.as_deref().unwrap_or_default().trim().to_lowercase();

    let message_has = |phrases: &[&str]| phrases.iter().any(|p| message.contains(p));
    let code_is = |codes: &[&str]| codes.iter().any(|c| code == *c);
    let code_has = |parts: &[&str]| !code.is_empty() && parts.iter().any(|p| code.contains(p));

    if message_has(TIMEOUT_PHRASES) || code_is(TIMEOUT_CODES) || code_has(&["timeout", "timedout"])
    {
        ErrorKind::Timeout
    } else if message_has(CONSTRAINT_PHRASES) || code_is(CONSTRAINT_CODES) {
        ErrorKind::Constraint
    } else if message_has(NETWORK_PHRASES) || code_has(&["net", "conn"]) {
        ErrorKind::Network
    } else if message_has(MEMORY_PHRASES) || code_is(MEMORY_CODES) || code_has(&["mem"]) {
        ErrorKind::Memory
    } else if message_has(VALIDATION_PHRASES)
        || code_is(VALIDATION_CODES)
        || is_data_exception(&code)
    {
        ErrorKind::Validation
    } else {
        ErrorKind::Unknown
    }
}

/// Classify a raw JSON error payload. `null` and non-objects are `Unknown`.
pub fn classify_json(value: &serde_json::Value) -> ErrorKind {
    classify(&ErrorDetails::from_json(value))
}

fn is_data_exception(code: &str) -> bool {
    code.len() == 5 && code.starts_with(DATA_EXCEPTION_CLASS)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
