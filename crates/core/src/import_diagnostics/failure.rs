//! Per-batch failure records.

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

use super::classifier::ErrorKind;

/// Message stored when the driver reported an error without one.
pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error";

/// Longest error message kept on a record, in characters.
pub const MAX_ERROR_MESSAGE_CHARS: usize = 2_000;

/// Longest error stack kept on a record, in characters.
pub const MAX_ERROR_STACK_CHARS: usize = 8_000;

/// Session state captured at the moment a batch failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub total_records_in_session: u64,
    /// Always within `0..=100`.
    pub progress_percent: u32,
    /// Reset to zero by any successful batch.
    pub consecutive_failures_at_time_of_error: u32,
}

/// One failed batch attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFailureRecord {
    pub batch_id: String,
    pub batch_number: u32,
    pub batch_size: u32,
    pub records_attempted: u32,
    pub records_succeeded: u32,
    pub error_kind: ErrorKind,
    pub error_code: Option<String>,
    /// At most [`MAX_ERROR_MESSAGE_CHARS`] characters plus a trailing `…`.
    pub error_message: String,
    /// At most [`MAX_ERROR_STACK_CHARS`] characters plus a trailing `…`.
    pub error_stack: Option<String>,
    pub retry_attempt: u32,
    pub processing_time_ms: u64,
    pub memory_usage_mb: Option<f64>,
    /// Redacted and size-capped; see [`super::sample::sanitize_sample`].
    pub sample_of_offending_data: Option<serde_json::Value>,
    pub timestamp: Timestamp,
    pub context_snapshot: ContextSnapshot,
}

/// Batch identifiers are unique within a session.
pub fn batch_id(session_id: &str, batch_number: u32) -> String {
    format!("{session_id}_batch_{batch_number}")
}

/// Position of a batch within the import, as a whole percentage.
///
/// Computed from the records preceding the batch. Returns 0 when the session
/// has no records and never exceeds 100.
pub fn progress_percent(batch_number: u32, batch_size: u32, total_records: u64) -> u32 {
    if total_records == 0 {
        return 0;
    }
    let preceding = f64::from(batch_number.saturating_sub(1)) * f64::from(batch_size);
    let percent = (preceding / total_records as f64 * 100.0).round();
    percent.clamp(0.0, 100.0) as u32
}
