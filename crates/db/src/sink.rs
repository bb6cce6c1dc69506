//! PostgreSQL-backed [`ImportLogSink`].
//!
//! Writes each finalized diagnostics session as one row of `import_logs`.

use async_trait::async_trait;
use salesdesk_core::import_diagnostics::{ImportLogRecord, ImportLogSink, PersistError};

use crate::models::import_log::CreateImportLog;
use crate::repositories::ImportLogRepo;
use crate::DbPool;

/// Persists import log records through [`ImportLogRepo`].
#[derive(Debug, Clone)]
pub struct PgImportLogSink {
    pool: DbPool,
}

impl PgImportLogSink {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ImportLogSink for PgImportLogSink {
    async fn append_log_record(&self, record: &ImportLogRecord) -> Result<(), PersistError> {
        let input = CreateImportLog::from(record);
        let row = ImportLogRepo::create(&self.pool, &input)
            .await
            .map_err(persist_error)?;
        tracing::debug!(
            import_log_id = row.id,
            session_type = %row.session_type,
            "Import log persisted",
        );
        Ok(())
    }
}

/// Map a database failure into the sink's error type.
///
/// A missing status row surfaces as a not-null violation on `status_id`,
/// which is reported as a rejected record rather than a database outage.
fn persist_error(e: sqlx::Error) -> PersistError {
    match &e {
        sqlx::Error::Database(db) if db.is_check_violation() || db.is_foreign_key_violation() => {
            PersistError::Rejected(db.message().to_string())
        }
        sqlx::Error::Database(db) if db.code().as_deref() == Some(NOT_NULL_VIOLATION) => {
            PersistError::Rejected(db.message().to_string())
        }
        _ => PersistError::Database(e.to_string()),
    }
}

/// SQLSTATE `not_null_violation`.
const NOT_NULL_VIOLATION: &str = "23502";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_database_errors_map_to_database_variant() {
        let err = persist_error(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, PersistError::Database(_)));
    }

    #[test]
    fn row_not_found_maps_to_database_variant() {
        let err = persist_error(sqlx::Error::RowNotFound);
        assert!(matches!(err, PersistError::Database(msg) if msg.contains("no rows")));
    }
}
