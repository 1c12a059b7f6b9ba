/// Inline SQL migrations for the session-info database schema.
///
/// Forward-only and additive: columns are added, never dropped or
/// rewritten, so the service starts cleanly against any earlier schema.
/// The applied version is tracked as `schema_version` in the `metadata`
/// table.
pub const MIGRATIONS: &[&str] = &[
    // Migration 1: sessions table
    r#"
CREATE TABLE IF NOT EXISTS sessions (
    session_id TEXT PRIMARY KEY,
    custom_name TEXT NOT NULL DEFAULT '',
    pinned INTEGER NOT NULL DEFAULT 0,
    archived INTEGER NOT NULL DEFAULT 0,
    summary TEXT,
    project_path TEXT,
    file_path TEXT,
    message_count INTEGER NOT NULL DEFAULT 0,
    total_duration_ms INTEGER NOT NULL DEFAULT 0,
    model TEXT NOT NULL DEFAULT 'Unknown',
    version INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#,
    // Migration 2: metadata table (schema version + store bookkeeping)
    r#"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#,
    // Migration 3: continuation / git / permission preferences
    r#"ALTER TABLE sessions ADD COLUMN continuation_session_id TEXT;"#,
    r#"ALTER TABLE sessions ADD COLUMN initial_commit_head TEXT NOT NULL DEFAULT '';"#,
    r#"ALTER TABLE sessions ADD COLUMN permission_mode TEXT NOT NULL DEFAULT 'default';"#,
    // Migration 4: incremental re-index bookkeeping + list-view indexes
    r#"ALTER TABLE sessions ADD COLUMN last_scanned_at_ms INTEGER NOT NULL DEFAULT 0;"#,
    r#"CREATE INDEX IF NOT EXISTS idx_sessions_created ON sessions(created_at DESC);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_sessions_updated ON sessions(updated_at DESC);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_sessions_project ON sessions(project_path);"#,
];

/// Columns checked (and added if absent) after migrations run, covering
/// databases created by versions whose migration numbering diverged.
pub const EXPECTED_SESSION_COLUMNS: &[(&str, &str)] = &[
    ("continuation_session_id", "TEXT"),
    ("initial_commit_head", "TEXT NOT NULL DEFAULT ''"),
    ("permission_mode", "TEXT NOT NULL DEFAULT 'default'"),
    ("last_scanned_at_ms", "INTEGER NOT NULL DEFAULT 0"),
];
