//! Post-hoc failure pattern analysis over a session's failure log.
//!
//! Pure logic: the result depends only on the records, the metrics and the
//! thresholds passed in.

use serde::{Deserialize, Serialize};

use super::classifier::ErrorKind;
use super::config::PatternThresholds;
use super::failure::BatchFailureRecord;
use super::metrics::SessionMetrics;

pub const ACTION_REDUCE_BATCH_SIZE: &str =
    "Reduce batch size in timeout-prone sections of the import";
pub const ACTION_REVIEW_DEDUPLICATION: &str =
    "Review deduplication and unique-constraint strategy before re-importing";
pub const ACTION_STREAM_PROCESSING: &str =
    "Switch to stream processing to reduce memory footprint";
pub const ACTION_TUNE_CONNECTION_POOL: &str =
    "Tune the connection pool and add a circuit breaker for repeated timeouts";

/// Findings for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorAnalysis {
    /// Progress percentages of timeout failures.
    pub timeout_clusters: Vec<u32>,
    /// Progress percentages of constraint failures.
    pub constraint_hotspots: Vec<u32>,
    /// Progress percentages of memory-related failures.
    pub memory_pressure_points: Vec<u32>,
    /// Deduplicated, in the order the rules fired.
    pub recommended_actions: Vec<String>,
}

impl ErrorAnalysis {
    fn recommend(&mut self, action: &str) {
        if !self.recommended_actions.iter().any(|a| a == action) {
            self.recommended_actions.push(action.to_string());
        }
    }

    /// Whether the analysis found anything worth persisting.
    pub fn is_empty(&self) -> bool {
        self.timeout_clusters.is_empty()
            && self.constraint_hotspots.is_empty()
            && self.memory_pressure_points.is_empty()
            && self.recommended_actions.is_empty()
    }
}

/// Scan the failure log for timeout clusters, constraint hotspots, memory
/// pressure and resource contention.
pub fn analyze(
    failures: &[BatchFailureRecord],
    metrics: &SessionMetrics,
    thresholds: &PatternThresholds,
) -> ErrorAnalysis {
    let mut analysis = ErrorAnalysis::default();

    let progress_of = |kind: ErrorKind| -> Vec<u32> {
        failures
            .iter()
            .filter(|f| f.error_kind == kind)
            .map(|f| f.context_snapshot.progress_percent)
            .collect()
    };

    let timeouts = progress_of(ErrorKind::Timeout);
    if timeouts.len() > thresholds.timeout_cluster_min {
        analysis.recommend(ACTION_REDUCE_BATCH_SIZE);
        analysis.timeout_clusters = timeouts;
    }

    let constraints = progress_of(ErrorKind::Constraint);
    if constraints.len() > thresholds.constraint_hotspot_min {
        analysis.recommend(ACTION_REVIEW_DEDUPLICATION);
        analysis.constraint_hotspots = constraints;
    }

    let pressure: Vec<u32> = failures
        .iter()
        .filter(|f| {
            f.error_kind == ErrorKind::Memory
                || f.memory_usage_mb
                    .is_some_and(|mb| mb > thresholds.memory_pressure_mb)
        })
        .map(|f| f.context_snapshot.progress_percent)
        .collect();
    if !pressure.is_empty() {
        analysis.recommend(ACTION_STREAM_PROCESSING);
        analysis.memory_pressure_points = pressure;
    }

    if metrics.resource_contention_detected {
        analysis.recommend(ACTION_TUNE_CONNECTION_POOL);
    }

    analysis
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
