//! Import log model: one row per finalized bulk-import diagnostics session.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use salesdesk_core::import_diagnostics::ImportLogRecord;
use salesdesk_core::types::{DbId, Timestamp};

/// A row from the `import_logs` table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ImportLog {
    pub id: DbId,
    pub status_id: DbId,
    pub session_type: String,
    pub records_processed: i64,
    pub records_inserted: i64,
    pub records_updated: i64,
    pub errors_json: Option<serde_json::Value>,
    pub duration_ms: i64,
    pub actor_id: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for inserting an import log. `status` is resolved by name from the
/// `import_log_statuses` lookup table.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateImportLog {
    pub session_type: String,
    pub status: String,
    pub records_processed: i64,
    pub records_inserted: i64,
    pub records_updated: i64,
    pub errors_json: Option<serde_json::Value>,
    pub duration_ms: i64,
    pub actor_id: Option<DbId>,
}

impl From<&ImportLogRecord> for CreateImportLog {
    fn from(record: &ImportLogRecord) -> Self {
        Self {
            session_type: record.session_type.clone(),
            status: record.status.clone(),
            records_processed: record.records_processed,
            records_inserted: record.records_inserted,
            records_updated: record.records_updated,
            errors_json: record.errors_json.clone(),
            duration_ms: record.duration_ms,
            actor_id: record.actor_id,
        }
    }
}

/// A row from the `import_log_statuses` lookup table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ImportLogStatus {
    pub id: DbId,
    pub name: String,
    pub label: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_dto_copies_every_record_field() {
        let record = ImportLogRecord {
            session_type: "stock_import".to_string(),
            status: "partial".to_string(),
            records_processed: 900,
            records_inserted: 850,
            records_updated: 50,
            errors_json: Some(serde_json::json!({"total_failures": 1})),
            duration_ms: 12_000,
            actor_id: Some(3),
        };
        let dto = CreateImportLog::from(&record);
        assert_eq!(dto.session_type, "stock_import");
        assert_eq!(dto.status, "partial");
        assert_eq!(dto.records_processed, 900);
        assert_eq!(dto.records_inserted, 850);
        assert_eq!(dto.records_updated, 50);
        assert_eq!(dto.errors_json, record.errors_json);
        assert_eq!(dto.duration_ms, 12_000);
        assert_eq!(dto.actor_id, Some(3));
    }
}
