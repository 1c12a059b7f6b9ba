// crates/db/src/lib.rs
// SQLite-backed metadata store for the session index.

mod migrations;
mod queries;

pub use queries::{ListQuery, SessionUpdate, SortBy, SortOrder, StoreStats, UPSERT_BATCH_SIZE};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

/// Config-dir value that selects a non-persistent store (used by tests).
pub const IN_MEMORY: &str = ":memory:";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Failed to determine config directory")]
    NoConfigDir,

    #[error("Failed to create database directory: {0}")]
    CreateDir(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Metadata store handle wrapping a SQLite connection pool.
///
/// One writer plus many readers: WAL journaling keeps list/detail reads
/// from blocking on the indexer's batch transactions. Clone freely — the
/// pool is shared.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl Database {
    /// Open (or create) the database at the given path and migrate forward.
    pub async fn new(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let db = Self {
            pool,
            db_path: path.to_owned(),
        };
        db.run_migrations().await?;

        info!("Session store opened at {}", path.display());
        Ok(db)
    }

    /// Create a non-persistent in-memory store.
    ///
    /// `shared_cache(true)` makes all pool connections see the same
    /// database; without it each connection would get its own empty copy.
    pub async fn new_in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?
            .shared_cache(true)
            .busy_timeout(std::time::Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        let db = Self {
            pool,
            db_path: PathBuf::new(),
        };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Open the store for a config directory: `<dir>/session-info.db`,
    /// or the in-memory store when the directory is the literal `":memory:"`.
    pub async fn open_config_dir(config_dir: &str) -> StoreResult<Self> {
        if config_dir == IN_MEMORY {
            return Self::new_in_memory().await;
        }
        Self::new(&Path::new(config_dir).join("session-info.db")).await
    }

    /// Open the database at the default location: `~/.cui/session-info.db`.
    pub async fn open_default() -> StoreResult<Self> {
        let path = cui_core::paths::db_path().ok_or(StoreError::NoConfigDir)?;
        Self::new(&path).await
    }

    /// Apply pending migrations and reconcile the schema.
    ///
    /// The applied version lives in `metadata.schema_version`, so
    /// non-idempotent statements (ALTER TABLE ADD COLUMN) run once. A
    /// duplicate-column error is tolerated for databases written before
    /// version tracking existed.
    async fn run_migrations(&self) -> StoreResult<()> {
        // The metadata table must exist before we can read the version.
        sqlx::query("CREATE TABLE IF NOT EXISTS metadata (key TEXT PRIMARY KEY, value TEXT NOT NULL)")
            .execute(&self.pool)
            .await?;

        let current_version = self
            .get_metadata("schema_version")
            .await?
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);

        for (i, migration) in migrations::MIGRATIONS.iter().enumerate() {
            let version = i + 1;
            if version <= current_version {
                continue;
            }
            match sqlx::query(migration).execute(&self.pool).await {
                Ok(_) => {}
                Err(e) if e.to_string().contains("duplicate column name") => {}
                Err(e) => return Err(e.into()),
            }
            self.set_metadata("schema_version", &version.to_string())
                .await?;
        }

        // Additive reconciliation for databases whose migration numbering
        // predates the tracked list.
        for (col, typedef) in migrations::EXPECTED_SESSION_COLUMNS {
            self.add_column_if_missing("sessions", col, typedef).await?;
        }

        let now = chrono::Utc::now().to_rfc3339();
        if self.get_metadata("created_at").await?.is_none() {
            self.set_metadata("created_at", &now).await?;
        }
        self.set_metadata("last_updated", &now).await?;

        Ok(())
    }

    async fn add_column_if_missing(
        &self,
        table: &str,
        column: &str,
        typedef: &str,
    ) -> StoreResult<()> {
        let columns: Vec<(String,)> =
            sqlx::query_as(&format!("SELECT name FROM pragma_table_info('{}')", table))
                .fetch_all(&self.pool)
                .await?;

        if !columns.iter().any(|(name,)| name == column) {
            let sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, typedef);
            sqlx::query(&sql).execute(&self.pool).await?;
            info!("Schema reconciliation: added {}.{}", table, column);
        }

        Ok(())
    }

    pub(crate) async fn get_metadata(&self, key: &str) -> StoreResult<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM metadata WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(v,)| v))
    }

    pub(crate) async fn set_metadata(&self, key: &str, value: &str) -> StoreResult<()> {
        sqlx::query("INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Path to the database file; empty for in-memory stores.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_in_memory() {
        let db = Database::new_in_memory().await.expect("in-memory store");

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions")
            .fetch_one(db.pool())
            .await
            .expect("sessions table should exist");
        assert_eq!(count.0, 0);

        let version = db.get_metadata("schema_version").await.unwrap();
        assert_eq!(
            version.as_deref(),
            Some(migrations::MIGRATIONS.len().to_string().as_str())
        );
    }

    #[tokio::test]
    async fn test_migrations_idempotent() {
        let db = Database::new_in_memory().await.expect("first open");
        db.run_migrations().await.expect("second run");

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn test_file_based_database() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("session-info.db");

        let db = Database::new(&db_path).await.expect("file-based store");
        assert!(db_path.exists());
        assert_eq!(db.db_path(), db_path.as_path());
    }

    #[tokio::test]
    async fn test_open_config_dir_recognizes_memory() {
        let db = Database::open_config_dir(IN_MEMORY).await.unwrap();
        assert_eq!(db.db_path(), Path::new(""));

        let tmp = tempfile::tempdir().unwrap();
        let db = Database::open_config_dir(tmp.path().to_str().unwrap())
            .await
            .unwrap();
        assert!(db.db_path().ends_with("session-info.db"));
    }

    #[tokio::test]
    async fn test_starts_against_earlier_schema() {
        // Simulate a database created before migrations 3 and 4 existed.
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("old.db");

        {
            let options = SqliteConnectOptions::from_str(&format!(
                "sqlite:{}",
                db_path.display()
            ))
            .unwrap()
            .create_if_missing(true);
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .connect_with(options)
                .await
                .unwrap();
            sqlx::query(migrations::MIGRATIONS[0])
                .execute(&pool)
                .await
                .unwrap();
            sqlx::query(migrations::MIGRATIONS[1])
                .execute(&pool)
                .await
                .unwrap();
            sqlx::query("INSERT INTO metadata (key, value) VALUES ('schema_version', '2')")
                .execute(&pool)
                .await
                .unwrap();
            pool.close().await;
        }

        let db = Database::new(&db_path).await.expect("migrate forward");
        let columns: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM pragma_table_info('sessions')")
                .fetch_all(db.pool())
                .await
                .unwrap();
        let names: Vec<&str> = columns.iter().map(|(n,)| n.as_str()).collect();
        assert!(names.contains(&"permission_mode"));
        assert!(names.contains(&"last_scanned_at_ms"));
    }
}
