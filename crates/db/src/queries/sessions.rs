// crates/db/src/queries/sessions.rs
// Session row operations: get-or-init, user/indexed upserts, list, delete.

use crate::queries::row_types::{SessionRow, SESSION_COLUMNS};
use crate::queries::{ListQuery, StoreStats};
use crate::{Database, StoreResult};
use chrono::Utc;
use cui_core::{IndexedMetadata, SessionRecord, SESSION_SCHEMA_VERSION};
use std::collections::HashMap;

/// Patch of user-preference fields applied by [`Database::update_session`].
///
/// `None` leaves a field untouched. Setting `continuation_session_id` to
/// the empty string clears it (the store normalizes "no continuation" to
/// absent).
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdate {
    pub custom_name: Option<String>,
    pub pinned: Option<bool>,
    pub archived: Option<bool>,
    pub continuation_session_id: Option<String>,
    pub initial_commit_head: Option<String>,
    pub permission_mode: Option<String>,
}

impl Database {
    /// Read a session row without creating it.
    pub async fn find_session(&self, session_id: &str) -> StoreResult<Option<SessionRecord>> {
        let sql = format!(
            "SELECT {} FROM sessions WHERE session_id = ?1",
            SESSION_COLUMNS
        );
        let row: Option<SessionRow> = sqlx::query_as(&sql)
            .bind(session_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(SessionRow::into_record))
    }

    /// Read a session row, inserting a default one when absent.
    ///
    /// Callers treat the store as a total function over session ids; the
    /// side-effecting insert also refreshes `metadata.last_updated`.
    pub async fn get_session(&self, session_id: &str) -> StoreResult<SessionRecord> {
        let now = Utc::now().to_rfc3339();

        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO sessions (session_id, version, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?3)
            "#,
        )
        .bind(session_id)
        .bind(SESSION_SCHEMA_VERSION)
        .bind(&now)
        .execute(self.pool())
        .await?
        .rows_affected();

        if inserted > 0 {
            self.set_metadata("last_updated", &now).await?;
        }

        // A concurrent delete between insert and read leaves no row; the
        // default record is what the caller would have observed anyway.
        match self.find_session(session_id).await? {
            Some(record) => Ok(record),
            None => Ok(SessionRecord::empty(session_id, now)),
        }
    }

    /// Merge user-preference fields into a session row.
    ///
    /// Indexed fields are never touched here; the row is created with
    /// defaults first when absent. `updated_at` and the schema marker are
    /// always refreshed.
    pub async fn update_session(
        &self,
        session_id: &str,
        patch: &SessionUpdate,
    ) -> StoreResult<SessionRecord> {
        // Ensure the row exists so a rename can precede the first index pass.
        self.get_session(session_id).await?;

        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            UPDATE sessions SET
                custom_name = COALESCE(?2, custom_name),
                pinned = COALESCE(?3, pinned),
                archived = COALESCE(?4, archived),
                continuation_session_id = CASE
                    WHEN ?5 IS NULL THEN continuation_session_id
                    ELSE NULLIF(?5, '')
                END,
                initial_commit_head = COALESCE(?6, initial_commit_head),
                permission_mode = COALESCE(?7, permission_mode),
                version = ?8,
                updated_at = ?9
            WHERE session_id = ?1
            "#,
        )
        .bind(session_id)
        .bind(&patch.custom_name)
        .bind(patch.pinned)
        .bind(patch.archived)
        .bind(&patch.continuation_session_id)
        .bind(&patch.initial_commit_head)
        .bind(&patch.permission_mode)
        .bind(SESSION_SCHEMA_VERSION)
        .bind(&now)
        .execute(self.pool())
        .await?;

        self.set_metadata("last_updated", &now).await?;

        match self.find_session(session_id).await? {
            Some(record) => Ok(record),
            None => Ok(SessionRecord::empty(session_id, now)),
        }
    }

    /// Transactional bulk upsert of scanner output.
    ///
    /// Existing rows get all indexed fields overwritten; absent rows are
    /// inserted with default user preferences. User-preference columns are
    /// deliberately excluded from the conflict clause so an indexer write
    /// can never clobber a concurrent rename. `last_scanned_at_ms` never
    /// regresses. On any mid-batch failure the whole transaction rolls
    /// back and the error surfaces to the caller for retry.
    pub async fn upsert_indexed_batch(&self, batch: &[IndexedMetadata]) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool().begin().await?;

        for meta in batch {
            let created_at = meta.first_timestamp.as_deref().unwrap_or(&now);
            let updated_at = meta.last_timestamp.as_deref().unwrap_or(&now);

            sqlx::query(
                r#"
                INSERT INTO sessions (
                    session_id, summary, project_path, file_path,
                    message_count, total_duration_ms, model, last_scanned_at_ms,
                    version, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                ON CONFLICT(session_id) DO UPDATE SET
                    summary = excluded.summary,
                    project_path = excluded.project_path,
                    file_path = excluded.file_path,
                    message_count = excluded.message_count,
                    total_duration_ms = excluded.total_duration_ms,
                    model = excluded.model,
                    last_scanned_at_ms = MAX(sessions.last_scanned_at_ms, excluded.last_scanned_at_ms),
                    version = excluded.version,
                    created_at = excluded.created_at,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&meta.session_id)
            .bind(&meta.summary)
            .bind(&meta.project_path)
            .bind(&meta.file_path)
            .bind(meta.message_count)
            .bind(meta.total_duration_ms)
            .bind(&meta.model)
            .bind(meta.last_scanned_at_ms)
            .bind(SESSION_SCHEMA_VERSION)
            .bind(created_at)
            .bind(updated_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        self.set_metadata("last_updated", &now).await?;
        Ok(())
    }

    /// Delete a session row. Returns false when no row existed.
    ///
    /// This is the only deletion path — the indexer never removes rows,
    /// even when the underlying file disappears.
    pub async fn delete_session(&self, session_id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE session_id = ?1")
            .bind(session_id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() > 0 {
            self.set_metadata("last_updated", &Utc::now().to_rfc3339())
                .await?;
        }
        Ok(result.rows_affected() > 0)
    }

    /// Filtered, ordered, paginated listing plus the total matching count
    /// (the count honors the filter but ignores pagination).
    pub async fn list_sessions(
        &self,
        query: &ListQuery,
    ) -> StoreResult<(Vec<SessionRecord>, i64)> {
        let mut conditions: Vec<String> = Vec::new();
        if query.project_path.is_some() {
            conditions.push("project_path = ?".to_string());
        }
        if query.archived.is_some() {
            conditions.push("archived = ?".to_string());
        }
        if query.pinned.is_some() {
            conditions.push("pinned = ?".to_string());
        }
        match query.has_continuation {
            Some(true) => conditions.push(
                "continuation_session_id IS NOT NULL AND continuation_session_id <> ''"
                    .to_string(),
            ),
            Some(false) => conditions.push(
                "(continuation_session_id IS NULL OR continuation_session_id = '')".to_string(),
            ),
            None => {}
        }

        let where_sql = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM sessions{}", where_sql);
        let mut count_query = sqlx::query_as::<_, (i64,)>(&count_sql);
        if let Some(p) = &query.project_path {
            count_query = count_query.bind(p);
        }
        if let Some(a) = query.archived {
            count_query = count_query.bind(a);
        }
        if let Some(p) = query.pinned {
            count_query = count_query.bind(p);
        }
        let (total,) = count_query.fetch_one(self.pool()).await?;

        // LIMIT -1 means unbounded in SQLite.
        let page_sql = format!(
            "SELECT {} FROM sessions{} ORDER BY {} {} LIMIT ? OFFSET ?",
            SESSION_COLUMNS,
            where_sql,
            query.sort_by.column(),
            query.order.keyword(),
        );
        let mut page_query = sqlx::query_as::<_, SessionRow>(&page_sql);
        if let Some(p) = &query.project_path {
            page_query = page_query.bind(p);
        }
        if let Some(a) = query.archived {
            page_query = page_query.bind(a);
        }
        if let Some(p) = query.pinned {
            page_query = page_query.bind(p);
        }
        page_query = page_query
            .bind(query.limit.unwrap_or(-1))
            .bind(query.offset.unwrap_or(0));

        let rows = page_query.fetch_all(self.pool()).await?;
        Ok((
            rows.into_iter().map(SessionRow::into_record).collect(),
            total,
        ))
    }

    /// Archive every currently-unarchived session in one statement.
    /// Returns the number of rows affected.
    pub async fn archive_all_sessions(&self) -> StoreResult<u64> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE sessions SET archived = 1, updated_at = ?1 WHERE archived = 0",
        )
        .bind(&now)
        .execute(self.pool())
        .await?;
        self.set_metadata("last_updated", &now).await?;
        Ok(result.rows_affected())
    }

    /// Aggregate statistics: row count, database size on disk, last write.
    pub async fn stats(&self) -> StoreResult<StoreStats> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions")
            .fetch_one(self.pool())
            .await?;
        let (byte_size,): (i64,) = sqlx::query_as(
            "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
        )
        .fetch_one(self.pool())
        .await?;
        let last_updated = self.get_metadata("last_updated").await?;
        Ok(StoreStats {
            count,
            byte_size,
            last_updated,
        })
    }

    /// Batch-load `session_id -> last_scanned_at_ms` for the full-scan
    /// mtime comparison, avoiding an N+1 pattern over candidate files.
    pub async fn get_all_scan_states(&self) -> StoreResult<HashMap<String, i64>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT session_id, last_scanned_at_ms FROM sessions")
                .fetch_all(self.pool())
                .await?;
        Ok(rows.into_iter().collect())
    }

    /// Look up a session's JSONL file path. `None` when the session is
    /// unknown or was never indexed.
    pub async fn get_session_file_path(&self, session_id: &str) -> StoreResult<Option<String>> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT file_path FROM sessions WHERE session_id = ?1")
                .bind(session_id)
                .fetch_optional(self.pool())
                .await?;
        Ok(row.and_then(|(p,)| p).filter(|p| !p.is_empty()))
    }
}
