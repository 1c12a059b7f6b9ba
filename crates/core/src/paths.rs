//! Centralized path functions for all app storage locations.
//!
//! Single source of truth — no ad-hoc `dirs::home_dir().join(...)` scattered
//! across crates.

use std::path::PathBuf;

/// Root of the on-disk session archive: `~/.claude/projects/`.
pub fn projects_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".claude").join("projects"))
}

/// App config root: `~/.cui/`.
pub fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".cui"))
}

/// SQLite database file: `~/.cui/session-info.db`.
pub fn db_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("session-info.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projects_dir() {
        let dir = projects_dir().unwrap();
        assert!(dir.to_string_lossy().ends_with(".claude/projects"));
    }

    #[test]
    fn test_db_path() {
        let path = db_path().unwrap();
        assert!(path.to_string_lossy().contains(".cui"));
        assert!(path.to_string_lossy().ends_with("session-info.db"));
    }
}
