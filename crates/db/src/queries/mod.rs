// crates/db/src/queries/mod.rs
// Session CRUD operations for the session-info SQLite database.

pub(crate) mod row_types;
mod sessions;

pub use sessions::SessionUpdate;

/// Rows per indexer upsert transaction.
pub const UPSERT_BATCH_SIZE: usize = 50;

/// Sort key for session listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortBy {
    CreatedAt,
    #[default]
    UpdatedAt,
}

impl SortBy {
    pub(crate) fn column(self) -> &'static str {
        match self {
            SortBy::CreatedAt => "created_at",
            SortBy::UpdatedAt => "updated_at",
        }
    }
}

/// Sort direction for session listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub(crate) fn keyword(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Filter, ordering, and pagination for [`crate::Database::list_sessions`].
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub project_path: Option<String>,
    pub archived: Option<bool>,
    pub pinned: Option<bool>,
    pub has_continuation: Option<bool>,
    pub sort_by: SortBy,
    pub order: SortOrder,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Aggregate store statistics.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub count: i64,
    pub byte_size: i64,
    pub last_updated: Option<String>,
}
