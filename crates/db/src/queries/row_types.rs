// crates/db/src/queries/row_types.rs
// Internal row type mapping sessions rows into the public record.

use cui_core::SessionRecord;
use sqlx::Row;

#[derive(Debug)]
pub(crate) struct SessionRow {
    session_id: String,
    custom_name: String,
    pinned: bool,
    archived: bool,
    continuation_session_id: Option<String>,
    initial_commit_head: String,
    permission_mode: String,
    summary: Option<String>,
    project_path: Option<String>,
    file_path: Option<String>,
    message_count: i64,
    total_duration_ms: i64,
    model: String,
    last_scanned_at_ms: i64,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for SessionRow {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            session_id: row.try_get("session_id")?,
            custom_name: row.try_get("custom_name")?,
            pinned: row.try_get("pinned")?,
            archived: row.try_get("archived")?,
            continuation_session_id: row.try_get("continuation_session_id")?,
            initial_commit_head: row.try_get("initial_commit_head")?,
            permission_mode: row.try_get("permission_mode")?,
            summary: row.try_get("summary")?,
            project_path: row.try_get("project_path")?,
            file_path: row.try_get("file_path")?,
            message_count: row.try_get("message_count")?,
            total_duration_ms: row.try_get("total_duration_ms")?,
            model: row.try_get("model")?,
            last_scanned_at_ms: row.try_get("last_scanned_at_ms")?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl SessionRow {
    /// Empty strings in nullable columns are normalized to absent so
    /// "no continuation" has exactly one representation.
    pub(crate) fn into_record(self) -> SessionRecord {
        SessionRecord {
            session_id: self.session_id,
            custom_name: self.custom_name,
            pinned: self.pinned,
            archived: self.archived,
            continuation_session_id: self
                .continuation_session_id
                .filter(|s| !s.is_empty()),
            initial_commit_head: self.initial_commit_head,
            permission_mode: self.permission_mode,
            summary: self.summary.filter(|s| !s.is_empty()),
            project_path: self.project_path.filter(|s| !s.is_empty()),
            file_path: self.file_path.filter(|s| !s.is_empty()),
            message_count: self.message_count,
            total_duration_ms: self.total_duration_ms,
            model: self.model,
            last_scanned_at_ms: self.last_scanned_at_ms,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Columns selected for every [`SessionRow`] read.
pub(crate) const SESSION_COLUMNS: &str = "session_id, custom_name, pinned, archived, \
    continuation_session_id, initial_commit_head, permission_mode, \
    summary, project_path, file_path, message_count, total_duration_ms, \
    model, last_scanned_at_ms, version, created_at, updated_at";
