//! Outputs of a diagnostics session: the live error summary and the final
//! report handed to the import log sink.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::failure::BatchFailureRecord;
use super::metrics::SessionMetrics;
use super::patterns::ErrorAnalysis;

/// Outcome reported by the upload driver when it finalizes a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Success,
    Partial,
    Failed,
}

impl SessionStatus {
    /// String representation for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Success => "success",
            SessionStatus::Partial => "partial",
            SessionStatus::Failed => "failed",
        }
    }

    /// Parse from a string, defaulting to `Failed` for unknown values.
    pub fn from_str(s: &str) -> Self {
        match s {
            "success" => SessionStatus::Success,
            "partial" => SessionStatus::Partial,
            _ => SessionStatus::Failed,
        }
    }
}

/// Live error counters for progress displays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub total_errors: u64,
    /// Keyed by error kind name; kinds with no failures are omitted.
    pub error_kind_counts: BTreeMap<String, u64>,
    pub consecutive_failures: u32,
    pub resource_contention_detected: bool,
}

/// Final, bounded report for one import session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub status: SessionStatus,
    pub metrics: SessionMetrics,
    pub error_analysis: ErrorAnalysis,
    /// The earliest failures only; see `total_failures` for the full count.
    pub failures: Vec<BatchFailureRecord>,
    pub total_failures: u64,
    pub duration_ms: u64,
    /// Whether the import log sink accepted the record.
    pub persisted: bool,
}

impl SessionReport {
    /// Body stored in the `errors_json` column. `None` for clean sessions.
    pub fn errors_json(&self) -> Result<Option<serde_json::Value>, serde_json::Error> {
        if self.failures.is_empty() && self.error_analysis.recommended_actions.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::json!({
            "session_id": self.metrics.session_id,
            "metrics": serde_json::to_value(&self.metrics)?,
            "error_analysis": serde_json::to_value(&self.error_analysis)?,
            "failures": serde_json::to_value(&self.failures)?,
            "total_failures": self.total_failures,
        })))
    }
}
