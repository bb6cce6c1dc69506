//! Running aggregates for one import session.
//!
//! Every update is O(1): averages are maintained incrementally and never
//! recomputed from history.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

use super::classifier::ErrorKind;
use super::failure::BatchFailureRecord;

/// Aggregate counters and statistics for a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub session_id: String,
    pub total_records: u64,
    pub start_time: Timestamp,
    pub end_time: Option<Timestamp>,

    pub total_batches: u64,
    pub successful_batches: u64,
    pub failed_batches: u64,
    pub total_retries: u64,
    pub records_processed: u64,

    pub average_batch_size: f64,
    pub average_processing_time_ms: f64,
    /// Sizes of successful batches, in the order they completed.
    pub batch_size_progression: Vec<u32>,
    pub peak_memory_usage_mb: f64,

    pub timeout_errors: u64,
    pub constraint_errors: u64,
    pub validation_errors: u64,
    pub network_errors: u64,
    pub memory_errors: u64,
    pub unknown_errors: u64,

    /// Sticky for the lifetime of the session.
    pub resource_contention_detected: bool,
}

impl SessionMetrics {
    pub fn new(session_id: impl Into<String>, total_records: u64, start_time: Timestamp) -> Self {
        Self {
            session_id: session_id.into(),
            total_records,
            start_time,
            end_time: None,
            total_batches: 0,
            successful_batches: 0,
            failed_batches: 0,
            total_retries: 0,
            records_processed: 0,
            average_batch_size: 0.0,
            average_processing_time_ms: 0.0,
            batch_size_progression: Vec::new(),
            peak_memory_usage_mb: 0.0,
            timeout_errors: 0,
            constraint_errors: 0,
            validation_errors: 0,
            network_errors: 0,
            memory_errors: 0,
            unknown_errors: 0,
            resource_contention_detected: false,
        }
    }

    /// Fold a successful batch into the aggregates.
    ///
    /// Averages use `avg' = (avg * (n - 1) + x) / n` where `n` is
    /// `total_batches` after the increment.
    pub fn apply_success(&mut self, batch_size: u32, records_processed: u32, processing_time_ms: u64) {
        self.successful_batches += 1;
        self.total_batches += 1;
        self.records_processed += u64::from(records_processed);
        self.batch_size_progression.push(batch_size);

        let n = self.total_batches as f64;
        self.average_processing_time_ms =
            (self.average_processing_time_ms * (n - 1.0) + processing_time_ms as f64) / n;
        self.average_batch_size = (self.average_batch_size * (n - 1.0) + f64::from(batch_size)) / n;
    }

    /// Fold a failed batch into the counters.
    pub fn apply_failure(&mut self, kind: ErrorKind, retry_attempt: u32) {
        self.failed_batches += 1;
        self.total_batches += 1;
        self.total_retries += u64::from(retry_attempt);
        *self.kind_count_mut(kind) += 1;
    }

    /// Number of failures recorded for `kind`.
    pub fn kind_count(&self, kind: ErrorKind) -> u64 {
        match kind {
            ErrorKind::Timeout => self.timeout_errors,
            ErrorKind::Constraint => self.constraint_errors,
            ErrorKind::Network => self.network_errors,
            ErrorKind::Validation => self.validation_errors,
            ErrorKind::Memory => self.memory_errors,
            ErrorKind::Unknown => self.unknown_errors,
        }
    }

    fn kind_count_mut(&mut self, kind: ErrorKind) -> &mut u64 {
        match kind {
            ErrorKind::Timeout => &mut self.timeout_errors,
            ErrorKind::Constraint => &mut self.constraint_errors,
            ErrorKind::Network => &mut self.network_errors,
            ErrorKind::Validation => &mut self.validation_errors,
            ErrorKind::Memory => &mut self.memory_errors,
            ErrorKind::Unknown => &mut self.unknown_errors,
        }
    }

    /// Recompute the per-kind totals from a failure log.
    pub fn derive_kind_totals(&mut self, failures: &[BatchFailureRecord]) {
        for kind in ErrorKind::ALL {
            *self.kind_count_mut(kind) = 0;
        }
        for failure in failures {
            *self.kind_count_mut(failure.error_kind) += 1;
        }
    }

    /// Per-kind totals keyed by [`ErrorKind::as_str`], zero counts omitted.
    pub fn kind_counts(&self) -> BTreeMap<String, u64> {
        ErrorKind::ALL
            .iter()
            .filter(|kind| self.kind_count(**kind) > 0)
            .map(|kind| (kind.as_str().to_string(), self.kind_count(*kind)))
            .collect()
    }

    /// Wall-clock duration, up to `end_time` or `now` while still running.
    pub fn duration_ms(&self, now: Timestamp) -> u64 {
        let end = self.end_time.unwrap_or(now);
        end.signed_duration_since(self.start_time)
            .num_milliseconds()
            .max(0) as u64
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
