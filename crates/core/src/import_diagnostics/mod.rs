//! Bulk-import diagnostics engine.
//!
//! Accompanies large batched uploads (sales and stock spreadsheet imports)
//! and turns their batch outcomes into classified, aggregated telemetry:
//!
//! - [`classifier`] maps loosely-structured errors to an [`ErrorKind`].
//! - [`resources`] samples process/pool usage into a bounded ring buffer.
//! - [`metrics`] keeps running counters and averages for one session.
//! - [`patterns`] scans the failure log for clusters and contention.
//! - [`session`] ties it together and hands one record to an [`ImportLogSink`].
//!
//! All logic here is pure apart from the sink call at finalize time.

pub mod classifier;
pub mod config;
pub mod failure;
pub mod metrics;
pub mod patterns;
pub mod report;
pub mod resources;
pub mod sample;
pub mod session;
pub mod sink;

pub use classifier::{classify, classify_json, ErrorDetails, ErrorKind};
pub use config::{DiagnosticsConfig, PatternThresholds};
pub use failure::{BatchFailureRecord, ContextSnapshot};
pub use metrics::SessionMetrics;
pub use patterns::{analyze, ErrorAnalysis};
pub use report::{ErrorSummary, SessionReport, SessionStatus};
pub use resources::{NoopProbe, ProcessMemoryProbe, ResourceProbe, ResourceSampler, ResourceSnapshot};
pub use session::{DiagnosticsSession, SessionState};
pub use sink::{ImportLogRecord, ImportLogSink, PersistError, TracingSink};
