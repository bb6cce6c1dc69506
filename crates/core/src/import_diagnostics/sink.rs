//! Persistence contract for finalized import sessions.
//!
//! The engine writes exactly one [`ImportLogRecord`] per finalized session.
//! Implementations live outside this crate (see `salesdesk-db`), except for
//! [`TracingSink`], which only emits a log event.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::DbId;

/// Failure to store an import log record.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Record rejected: {0}")]
    Rejected(String),
}

/// The row written for one finalized session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportLogRecord {
    pub session_type: String,
    pub status: String,
    pub records_processed: i64,
    pub records_inserted: i64,
    pub records_updated: i64,
    /// Serialized session report; `None` for clean sessions.
    pub errors_json: Option<serde_json::Value>,
    pub duration_ms: i64,
    pub actor_id: Option<DbId>,
}

/// Append-only store for import log records.
#[async_trait]
pub trait ImportLogSink: Send + Sync {
    async fn append_log_record(&self, record: &ImportLogRecord) -> Result<(), PersistError>;
}

/// Sink that emits the record as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl ImportLogSink for TracingSink {
    async fn append_log_record(&self, record: &ImportLogRecord) -> Result<(), PersistError> {
        let errors = match &record.errors_json {
            Some(value) => serde_json::to_string(value)
                .map_err(|e| PersistError::Serialization(e.to_string()))?,
            None => String::new(),
        };
        tracing::info!(
            session_type = %record.session_type,
            status = %record.status,
            records_processed = record.records_processed,
            records_inserted = record.records_inserted,
            records_updated = record.records_updated,
            duration_ms = record.duration_ms,
            actor_id = ?record.actor_id,
            errors = %errors,
            "Import session finalized",
        );
        Ok(())
    }
}
