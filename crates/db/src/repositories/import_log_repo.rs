//! Repository for the `import_logs` table.

use sqlx::PgPool;
use salesdesk_core::types::DbId;

use crate::models::import_log::{CreateImportLog, ImportLog, ImportLogStatus};

/// Column list for `import_logs` queries.
const COLUMNS: &str = "id, status_id, session_type, records_processed, records_inserted, \
     records_updated, errors_json, duration_ms, actor_id, created_at, updated_at";

/// Default page size for [`ImportLogRepo::list_recent`].
pub const DEFAULT_LIST_LIMIT: i64 = 25;

/// Upper bound for [`ImportLogRepo::list_recent`].
pub const MAX_LIST_LIMIT: i64 = 100;

/// Clamp a caller-supplied page size into `[1, MAX_LIST_LIMIT]`.
pub fn clamp_list_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

/// Provides append and read-back operations for import logs.
pub struct ImportLogRepo;

impl ImportLogRepo {
    /// Insert a new import log, returning the created row.
    pub async fn create(pool: &PgPool, input: &CreateImportLog) -> Result<ImportLog, sqlx::Error> {
        let sql = format!(
            "INSERT INTO import_logs \
                (status_id, session_type, records_processed, records_inserted, \
                 records_updated, errors_json, duration_ms, actor_id) \
             VALUES ( \
                (SELECT id FROM import_log_statuses WHERE name = $1), \
                $2, $3, $4, $5, $6, $7, $8 \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ImportLog>(&sql)
            .bind(&input.status)
            .bind(&input.session_type)
            .bind(input.records_processed)
            .bind(input.records_inserted)
            .bind(input.records_updated)
            .bind(&input.errors_json)
            .bind(input.duration_ms)
            .bind(input.actor_id)
            .fetch_one(pool)
            .await
    }

    /// Find an import log by its internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<ImportLog>, sqlx::Error> {
        let sql = format!("SELECT {COLUMNS} FROM import_logs WHERE id = $1");
        sqlx::query_as::<_, ImportLog>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List the most recent logs, newest first, optionally filtered by
    /// `session_type`.
    pub async fn list_recent(
        pool: &PgPool,
        session_type: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<ImportLog>, sqlx::Error> {
        let sql = format!(
            "SELECT {COLUMNS} FROM import_logs \
             WHERE ($1::TEXT IS NULL OR session_type = $1) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2"
        );
        sqlx::query_as::<_, ImportLog>(&sql)
            .bind(session_type)
            .bind(clamp_list_limit(limit))
            .fetch_all(pool)
            .await
    }

    /// List all rows of the `import_log_statuses` lookup table.
    pub async fn list_statuses(pool: &PgPool) -> Result<Vec<ImportLogStatus>, sqlx::Error> {
        sqlx::query_as::<_, ImportLogStatus>(
            "SELECT id, name, label, created_at, updated_at \
             FROM import_log_statuses ORDER BY id",
        )
        .fetch_all(pool)
        .await
    }
}
