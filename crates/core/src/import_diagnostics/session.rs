//! Lifecycle of one bulk-import diagnostics session.
//!
//! [`DiagnosticsSession`] is owned by the upload driver and moves through
//! `Idle -> Active -> Finalized`. All mutable state sits behind a single
//! mutex so counters and running averages are updated atomically, and the
//! lock is never held across the final persistence `.await`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use rand::Rng;

use crate::error::CoreError;
use crate::types::DbId;

use super::classifier::{classify, ErrorDetails, ErrorKind};
use super::config::{DiagnosticsConfig, MAX_REPORTED_FAILURES};
use super::failure::{
    batch_id, progress_percent, BatchFailureRecord, ContextSnapshot, MAX_ERROR_MESSAGE_CHARS,
    MAX_ERROR_STACK_CHARS, UNKNOWN_ERROR_MESSAGE,
};
use super::metrics::SessionMetrics;
use super::patterns;
use super::report::{ErrorSummary, SessionReport, SessionStatus};
use super::resources::{ResourceProbe, ResourceSampler, ResourceSnapshot};
use super::sample::{sanitize_sample, truncate_chars};
use super::sink::{ImportLogRecord, ImportLogSink};

/// Length of the random suffix appended to session ids.
const SESSION_ID_SUFFIX_LEN: usize = 9;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
    Finalized,
}

#[derive(Debug)]
struct SessionInner {
    state: SessionState,
    metrics: Option<SessionMetrics>,
    failures: Vec<BatchFailureRecord>,
    sampler: ResourceSampler,
    consecutive_failures: u32,
    /// Driver-supplied `(inserted, updated)` counts for the log record.
    write_counts: Option<(u64, u64)>,
}

/// Collects diagnostics for one bulk import at a time.
///
/// Safe to share via `Arc<DiagnosticsSession>`; recording methods never
/// fail and never block on I/O.
pub struct DiagnosticsSession {
    session_type: String,
    config: DiagnosticsConfig,
    probe: Arc<dyn ResourceProbe>,
    sink: Arc<dyn ImportLogSink>,
    actor_id: Option<DbId>,
    inner: Mutex<SessionInner>,
}

impl DiagnosticsSession {
    /// Create an idle session tracker.
    ///
    /// `session_type` names the kind of import (e.g. `"sales_import"`) and
    /// prefixes every generated session id.
    pub fn new(
        session_type: impl Into<String>,
        config: DiagnosticsConfig,
        probe: Arc<dyn ResourceProbe>,
        sink: Arc<dyn ImportLogSink>,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        let sampler = ResourceSampler::new(config.snapshot_capacity);
        Ok(Self {
            session_type: session_type.into(),
            config,
            probe,
            sink,
            actor_id: None,
            inner: Mutex::new(SessionInner {
                state: SessionState::Idle,
                metrics: None,
                failures: Vec::new(),
                sampler,
                consecutive_failures: 0,
                write_counts: None,
            }),
        })
    }

    /// Attribute persisted records to a user.
    pub fn with_actor(mut self, actor_id: DbId) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    /// Poisoning is ignored: no update panics while holding the guard.
    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Begin a new session, discarding any previous state.
    pub fn start_session(&self, total_records: u64) -> String {
        let session_id = self.generate_session_id();
        let mut inner = self.lock();

        if inner.state == SessionState::Active {
            tracing::warn!(
                previous_session_id = inner.metrics.as_ref().map(|m| m.session_id.as_str()),
                "Discarding import session that was never finalized",
            );
        }

        inner.state = SessionState::Active;
        inner.metrics = Some(SessionMetrics::new(
            session_id.clone(),
            total_records,
            Utc::now(),
        ));
        inner.failures.clear();
        inner.sampler.clear();
        inner.consecutive_failures = 0;
        inner.write_counts = None;

        tracing::info!(
            session_id = %session_id,
            session_type = %self.session_type,
            total_records,
            "Import diagnostics session started",
        );
        session_id
    }

    fn generate_session_id(&self) -> String {
        let suffix: String = rand::rng()
            .sample_iter(&rand::distr::Alphanumeric)
            .take(SESSION_ID_SUFFIX_LEN)
            .map(char::from)
            .collect();
        format!(
            "{}_{}_{}",
            self.session_type,
            Utc::now().timestamp_millis(),
            suffix
        )
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn session_id(&self) -> Option<String> {
        self.lock().metrics.as_ref().map(|m| m.session_id.clone())
    }

    // -----------------------------------------------------------------------
    // Recording
    // -----------------------------------------------------------------------

    /// Record a batch that was written successfully.
    pub fn record_batch_success(
        &self,
        batch_number: u32,
        batch_size: u32,
        records_processed: u32,
        processing_time_ms: u64,
    ) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let Some(metrics) = active_metrics(inner.state, &mut inner.metrics) else {
            tracing::warn!(batch_number, "Batch success reported outside an active session");
            return;
        };

        inner.consecutive_failures = 0;
        metrics.apply_success(batch_size, records_processed, processing_time_ms);

        tracing::debug!(
            session_id = %metrics.session_id,
            batch_number,
            batch_size,
            processing_time_ms,
            "Batch succeeded",
        );
    }

    /// Record a failed batch attempt and return the stored failure record.
    ///
    /// Returns `None` when no session is active.
    #[allow(clippy::too_many_arguments)]
    pub fn record_batch_failure(
        &self,
        batch_number: u32,
        batch_size: u32,
        records_attempted: u32,
        error: &ErrorDetails,
        retry_attempt: u32,
        processing_time_ms: u64,
        data_sample: Option<&serde_json::Value>,
    ) -> Option<BatchFailureRecord> {
        let error_kind = classify(error);
        let memory_usage_mb =
            Some(self.probe.memory_usage_mb()).filter(|mb| mb.is_finite() && *mb > 0.0);
        let sample = data_sample.map(sanitize_sample);

        let mut guard = self.lock();
        let inner = &mut *guard;
        let Some(metrics) = active_metrics(inner.state, &mut inner.metrics) else {
            tracing::warn!(batch_number, "Batch failure reported outside an active session");
            return None;
        };

        inner.consecutive_failures += 1;
        let consecutive = inner.consecutive_failures;

        let record = BatchFailureRecord {
            batch_id: batch_id(&metrics.session_id, batch_number),
            batch_number,
            batch_size,
            records_attempted,
            records_succeeded: 0,
            error_kind,
            error_code: error.code.clone(),
            error_message: error
                .message
                .as_deref()
                .filter(|m| !m.trim().is_empty())
                .map_or_else(
                    || UNKNOWN_ERROR_MESSAGE.to_string(),
                    |m| truncate_chars(m, MAX_ERROR_MESSAGE_CHARS),
                ),
            error_stack: error
                .stack
                .as_deref()
                .map(|stack| truncate_chars(stack, MAX_ERROR_STACK_CHARS)),
            retry_attempt,
            processing_time_ms,
            memory_usage_mb,
            sample_of_offending_data: sample,
            timestamp: Utc::now(),
            context_snapshot: ContextSnapshot {
                total_records_in_session: metrics.total_records,
                progress_percent: progress_percent(batch_number, batch_size, metrics.total_records),
                consecutive_failures_at_time_of_error: consecutive,
            },
        };

        metrics.apply_failure(error_kind, retry_attempt);

        if error_kind == ErrorKind::Timeout
            && consecutive >= self.config.contention_threshold
            && !metrics.resource_contention_detected
        {
            metrics.resource_contention_detected = true;
            tracing::warn!(
                session_id = %metrics.session_id,
                batch_number,
                consecutive_failures = consecutive,
                "Resource contention detected: repeated consecutive timeouts",
            );
        }

        tracing::warn!(
            session_id = %metrics.session_id,
            batch_id = %record.batch_id,
            error_kind = error_kind.as_str(),
            retry_attempt,
            progress_percent = record.context_snapshot.progress_percent,
            error = %record.error_message,
            "Batch failed",
        );

        inner.failures.push(record.clone());
        Some(record)
    }

    /// Take a resource snapshot. It is retained only while a session is active.
    pub fn sample_resources(&self) -> ResourceSnapshot {
        let snapshot = ResourceSnapshot::capture(self.probe.as_ref());

        let mut guard = self.lock();
        let inner = &mut *guard;
        if let Some(metrics) = active_metrics(inner.state, &mut inner.metrics) {
            inner.sampler.push(snapshot.clone());
            metrics.peak_memory_usage_mb = inner.sampler.peak();
        }
        snapshot
    }

    /// Override the inserted/updated counts written to the import log.
    ///
    /// By default every processed record counts as inserted.
    pub fn set_write_counts(&self, records_inserted: u64, records_updated: u64) {
        self.lock().write_counts = Some((records_inserted, records_updated));
    }

    // -----------------------------------------------------------------------
    // Read-only views
    // -----------------------------------------------------------------------

    /// Copy of the current aggregates, or `None` before the first session.
    pub fn current_metrics(&self) -> Option<SessionMetrics> {
        self.lock().metrics.clone()
    }

    pub fn error_summary(&self) -> ErrorSummary {
        let inner = self.lock();
        match inner.metrics.as_ref() {
            Some(metrics) => ErrorSummary {
                total_errors: metrics.failed_batches,
                error_kind_counts: metrics.kind_counts(),
                consecutive_failures: inner.consecutive_failures,
                resource_contention_detected: metrics.resource_contention_detected,
            },
            None => ErrorSummary::default(),
        }
    }

    /// Every failure recorded in the current session, oldest first.
    pub fn failures(&self) -> Vec<BatchFailureRecord> {
        self.lock().failures.clone()
    }

    /// Snapshots currently held in the ring buffer, oldest first.
    pub fn snapshots(&self) -> Vec<ResourceSnapshot> {
        self.lock().sampler.snapshots().cloned().collect()
    }

    // -----------------------------------------------------------------------
    // Finalization
    // -----------------------------------------------------------------------

    /// Close the session, analyze its failures and persist one log record.
    ///
    /// A persistence failure is logged and reflected in
    /// [`SessionReport::persisted`]; it is never returned as an error.
    /// Returns `None` when no session is active.
    pub async fn finalize_session(&self, status: SessionStatus) -> Option<SessionReport> {
        let (mut report, record) = {
            let mut guard = self.lock();
            let inner = &mut *guard;
            let Some(metrics) = active_metrics(inner.state, &mut inner.metrics) else {
                tracing::warn!("Finalize requested without an active import session");
                return None;
            };

            let now = Utc::now();
            metrics.end_time = Some(now);
            metrics.peak_memory_usage_mb = inner.sampler.peak();
            metrics.derive_kind_totals(&inner.failures);

            let error_analysis = patterns::analyze(&inner.failures, metrics, &self.config.patterns);
            let report_cap = self.config.max_reported_failures.min(MAX_REPORTED_FAILURES);
            let report = SessionReport {
                status,
                metrics: metrics.clone(),
                error_analysis,
                failures: inner.failures.iter().take(report_cap).cloned().collect(),
                total_failures: inner.failures.len() as u64,
                duration_ms: metrics.duration_ms(now),
                persisted: false,
            };

            let (inserted, updated) = inner
                .write_counts
                .unwrap_or((metrics.records_processed, 0));
            let errors_json = match report.errors_json() {
                Ok(body) => body,
                Err(e) => {
                    tracing::error!(
                        session_id = %metrics.session_id,
                        error = %e,
                        "Failed to serialize import diagnostics report",
                    );
                    None
                }
            };
            let record = ImportLogRecord {
                session_type: self.session_type.clone(),
                status: status.as_str().to_string(),
                records_processed: saturating_i64(metrics.records_processed),
                records_inserted: saturating_i64(inserted),
                records_updated: saturating_i64(updated),
                errors_json,
                duration_ms: saturating_i64(report.duration_ms),
                actor_id: self.actor_id,
            };

            inner.state = SessionState::Finalized;
            (report, record)
        };

        let session_id = report.metrics.session_id.clone();
        match self.sink.append_log_record(&record).await {
            Ok(()) => {
                report.persisted = true;
                tracing::info!(
                    session_id = %session_id,
                    status = status.as_str(),
                    total_batches = report.metrics.total_batches,
                    failed_batches = report.metrics.failed_batches,
                    duration_ms = report.duration_ms,
                    "Import diagnostics session finalized",
                );
            }
            Err(e) => {
                tracing::error!(
                    session_id = %session_id,
                    error = %e,
                    "Failed to persist import diagnostics; report returned unpersisted",
                );
            }
        }

        Some(report)
    }
}

/// Metrics of the active session, or `None` in any other state.
fn active_metrics(
    state: SessionState,
    metrics: &mut Option<SessionMetrics>,
) -> Option<&mut SessionMetrics> {
    match state {
        SessionState::Active => metrics.as_mut(),
        SessionState::Idle | SessionState::Finalized => None,
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::import_diagnostics::resources::NoopProbe;
    use crate::import_diagnostics::sink::TracingSink;

    fn session() -> DiagnosticsSession {
        DiagnosticsSession::new(
            "sales_import",
            DiagnosticsConfig::default(),
            Arc::new(NoopProbe),
            Arc::new(TracingSink),
        )
        .expect("default config is valid")
    }

    fn fail(s: &DiagnosticsSession, batch_number: u32, message: &str) -> BatchFailureRecord {
        s.record_batch_failure(batch_number, 100, 100, &ErrorDetails::new(message), 0, 10, None)
            .expect("session is active")
    }

    #[test]
    fn new_session_is_idle() {
        let s = session();
        assert_eq!(s.state(), SessionState::Idle);
        assert!(s.current_metrics().is_none());
        assert!(s.session_id().is_none());
        assert_eq!(s.error_summary(), ErrorSummary::default());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = DiagnosticsConfig {
            snapshot_capacity: 0,
            ..DiagnosticsConfig::default()
        };
        let result = DiagnosticsSession::new("x", config, Arc::new(NoopProbe), Arc::new(TracingSink));
        assert!(result.is_err());
    }

    #[test]
    fn session_ids_are_prefixed_and_unique() {
        let s = session();
        let first = s.start_session(10);
        let second = s.start_session(10);
        assert!(first.starts_with("sales_import_"));
        assert_ne!(first, second);
        assert_eq!(s.session_id(), Some(second));
    }

    #[test]
    fn recording_while_idle_is_ignored() {
        let s = session();
        s.record_batch_success(1, 10, 10, 5);
        assert!(s
            .record_batch_failure(1, 10, 10, &ErrorDetails::default(), 0, 5, None)
            .is_none());
        assert!(s.current_metrics().is_none());
    }

    #[test]
    fn consecutive_counter_resets_on_success() {
        let s = session();
        s.start_session(1000);
        fail(&s, 1, "invalid sku");
        fail(&s, 2, "invalid sku");
        let third = fail(&s, 3, "invalid sku");
        assert_eq!(third.context_snapshot.consecutive_failures_at_time_of_error, 3);

        s.record_batch_success(4, 100, 100, 10);
        let fourth = fail(&s, 5, "invalid sku");
        assert_eq!(fourth.context_snapshot.consecutive_failures_at_time_of_error, 1);
    }

    #[test]
    fn three_consecutive_timeouts_flag_contention() {
        let s = session();
        s.start_session(1000);
        for n in 1..=3 {
            fail(&s, n, "statement timeout");
        }
        assert!(s.error_summary().resource_contention_detected);
    }

    #[test]
    fn three_consecutive_validation_failures_do_not() {
        let s = session();
        s.start_session(1000);
        for n in 1..=3 {
            fail(&s, n, "invalid date");
        }
        assert!(!s.error_summary().resource_contention_detected);
    }

    #[test]
    fn contention_needs_the_current_failure_to_be_a_timeout() {
        let s = session();
        s.start_session(1000);
        fail(&s, 1, "statement timeout");
        fail(&s, 2, "statement timeout");
        fail(&s, 3, "invalid date");
        assert!(!s.error_summary().resource_contention_detected);
        fail(&s, 4, "statement timeout");
        assert!(s.error_summary().resource_contention_detected);
    }

    #[test]
    fn contention_is_sticky() {
        let s = session();
        s.start_session(1000);
        for n in 1..=3 {
            fail(&s, n, "request timeout");
        }
        s.record_batch_success(4, 100, 100, 10);
        s.record_batch_success(5, 100, 100, 10);
        assert!(s.error_summary().resource_contention_detected);
    }

    #[test]
    fn failure_record_fields() {
        let s = session();
        let id = s.start_session(1000);
        let error = ErrorDetails::new("duplicate key value violates unique constraint")
            .with_code("23505")
            .with_stack("at insert_sales");
        let record = s
            .record_batch_failure(
                3,
                100,
                100,
                &error,
                2,
                80,
                Some(&json!([{"sku": "A", "apiToken": "abc"}, {"sku": "B"}, {"sku": "C"}])),
            )
            .expect("active");

        assert_eq!(record.batch_id, format!("{id}_batch_3"));
        assert_eq!(record.error_kind, ErrorKind::Constraint);
        assert_eq!(record.error_code.as_deref(), Some("23505"));
        assert_eq!(record.error_stack.as_deref(), Some("at insert_sales"));
        assert_eq!(record.records_succeeded, 0);
        assert_eq!(record.retry_attempt, 2);
        assert_eq!(record.context_snapshot.progress_percent, 20);
        assert_eq!(record.context_snapshot.total_records_in_session, 1000);
        assert!(record.memory_usage_mb.is_none());

        let sample = record.sample_of_offending_data.expect("sample kept");
        assert_eq!(sample.as_array().map(Vec::len), Some(2));
        assert_eq!(sample[0]["apiToken"], "[REDACTED]");
    }

    #[test]
    fn missing_message_is_replaced() {
        let s = session();
        s.start_session(10);
        let record = s
            .record_batch_failure(1, 5, 5, &ErrorDetails::default(), 0, 1, None)
            .expect("active");
        assert_eq!(record.error_message, UNKNOWN_ERROR_MESSAGE);
        assert_eq!(record.error_kind, ErrorKind::Unknown);
    }

    #[test]
    fn oversized_error_text_is_capped() {
        let s = session();
        s.start_session(10);
        let error = ErrorDetails::new(format!("connection timeout {}", "m".repeat(10_000)))
            .with_stack("s".repeat(50_000));
        let record = s
            .record_batch_failure(1, 5, 5, &error, 0, 1, None)
            .expect("active");

        assert_eq!(record.error_kind, ErrorKind::Timeout);
        assert_eq!(record.error_message.chars().count(), MAX_ERROR_MESSAGE_CHARS + 1);
        assert!(record.error_message.starts_with("connection timeout"));
        assert!(record.error_message.ends_with('…'));
        let stack = record.error_stack.expect("stack kept");
        assert_eq!(stack.chars().count(), MAX_ERROR_STACK_CHARS + 1);
    }

    #[test]
    fn short_error_text_is_stored_verbatim() {
        let s = session();
        s.start_session(10);
        let error = ErrorDetails::new("duplicate key").with_stack("at insert_batch");
        let record = s
            .record_batch_failure(1, 5, 5, &error, 0, 1, None)
            .expect("active");
        assert_eq!(record.error_message, "duplicate key");
        assert_eq!(record.error_stack.as_deref(), Some("at insert_batch"));
    }

    #[test]
    fn start_session_resets_previous_state() {
        let s = session();
        s.start_session(100);
        s.record_batch_success(1, 10, 10, 5);
        fail(&s, 2, "network down");
        s.sample_resources();

        s.start_session(50);
        let metrics = s.current_metrics().expect("active");
        assert_eq!(metrics.total_records, 50);
        assert_eq!(metrics.total_batches, 0);
        assert!(metrics.batch_size_progression.is_empty());
        assert!(s.failures().is_empty());
        assert!(s.snapshots().is_empty());
        assert_eq!(s.error_summary().consecutive_failures, 0);
    }

    #[test]
    fn error_summary_counts_by_kind() {
        let s = session();
        s.start_session(1000);
        fail(&s, 1, "connection refused");
        fail(&s, 2, "connection refused");
        fail(&s, 3, "out of memory");
        let summary = s.error_summary();
        assert_eq!(summary.total_errors, 3);
        assert_eq!(summary.consecutive_failures, 3);
        assert_eq!(summary.error_kind_counts.get("network"), Some(&2));
        assert_eq!(summary.error_kind_counts.get("memory"), Some(&1));
    }

    #[test]
    fn snapshots_are_retained_only_while_active() {
        let s = session();
        s.sample_resources();
        assert!(s.snapshots().is_empty());
        s.start_session(10);
        s.sample_resources();
        s.sample_resources();
        assert_eq!(s.snapshots().len(), 2);
    }

    #[tokio::test]
    async fn finalize_twice_returns_none_the_second_time() {
        let s = session();
        s.start_session(10);
        s.record_batch_success(1, 10, 10, 5);
        let report = s.finalize_session(SessionStatus::Success).await;
        assert!(report.is_some());
        assert_eq!(s.state(), SessionState::Finalized);
        assert!(s.finalize_session(SessionStatus::Success).await.is_none());
    }

    #[tokio::test]
    async fn recording_after_finalize_is_ignored() {
        let s = session();
        s.start_session(10);
        s.finalize_session(SessionStatus::Success).await;
        s.record_batch_success(1, 10, 10, 5);
        let metrics = s.current_metrics().expect("finalized metrics kept");
        assert_eq!(metrics.total_batches, 0);
        assert!(metrics.end_time.is_some());
    }

    #[tokio::test]
    async fn finalize_without_session_returns_none() {
        assert!(session().finalize_session(SessionStatus::Failed).await.is_none());
    }
}
