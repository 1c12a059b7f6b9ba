// crates/core/src/discovery.rs
//! Discovery of session files under the projects directory.
//!
//! Layout on disk:
//! ```text
//! ~/.claude/projects/
//!   <encoded-project-dir>/
//!     <session-id>.jsonl
//!     agent-<task-id>.jsonl     (sub-task logs, never indexed)
//! ```

use crate::error::DiscoveryError;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::fs;
use tracing::debug;

/// A candidate session file found during discovery.
#[derive(Debug, Clone)]
pub struct SessionFile {
    /// Full path to the .jsonl file.
    pub path: PathBuf,
    /// Encoded project directory name (e.g. `-Users-foo-project-a`).
    pub project_dir: String,
    /// Modification time in milliseconds since the epoch.
    pub mtime_ms: i64,
}

/// True for files the indexer cares about: `*.jsonl`, basename not
/// prefixed `agent-`. Applied identically in the full scan and the
/// incremental watch path.
pub fn is_session_file(path: &Path) -> bool {
    let is_jsonl = path
        .extension()
        .map(|ext| ext == "jsonl")
        .unwrap_or(false);
    let is_agent_log = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with("agent-"))
        .unwrap_or(false);
    is_jsonl && !is_agent_log
}

/// Decode an encoded project directory name into a path, last-resort
/// fallback for files that never record a `cwd`:
/// `-Users-foo-project-a` becomes `/Users/foo/project/a`.
pub fn decode_project_dir_name(name: &str) -> String {
    name.replace('-', "/")
}

/// Millisecond mtime of a file, or `None` when it cannot be read.
pub async fn file_mtime_ms(path: &Path) -> Option<i64> {
    let metadata = fs::metadata(path).await.ok()?;
    let modified = metadata.modified().ok()?;
    modified
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_millis() as i64)
}

/// List every candidate session file under `projects_dir`.
///
/// Unreadable project subdirectories are skipped with a debug log so one
/// bad directory never aborts discovery.
pub async fn list_session_files(
    projects_dir: &Path,
) -> Result<Vec<SessionFile>, DiscoveryError> {
    let mut files = Vec::new();

    let mut entries = fs::read_dir(projects_dir)
        .await
        .map_err(|e| DiscoveryError::io(projects_dir, e))?;

    while let Ok(Some(project_entry)) = entries.next_entry().await {
        let project_path = project_entry.path();

        let file_type = match project_entry.file_type().await {
            Ok(ft) => ft,
            Err(_) => continue,
        };
        if !file_type.is_dir() {
            continue;
        }

        let project_dir = project_path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        let mut session_entries = match fs::read_dir(&project_path).await {
            Ok(e) => e,
            Err(e) => {
                debug!("Cannot read project dir {:?}: {}", project_path, e);
                continue;
            }
        };

        while let Ok(Some(session_entry)) = session_entries.next_entry().await {
            let file_path = session_entry.path();
            if !is_session_file(&file_path) {
                continue;
            }

            let mtime_ms = match file_mtime_ms(&file_path).await {
                Some(t) => t,
                None => continue,
            };

            files.push(SessionFile {
                path: file_path,
                project_dir: project_dir.clone(),
                mtime_ms,
            });
        }
    }

    Ok(files)
}

/// Locate `<session_id>.jsonl` anywhere under the projects directory.
///
/// Fallback path resolution for detail reads when the index has no
/// (or a stale) file path for the session.
pub async fn find_session_file(projects_dir: &Path, session_id: &str) -> Option<PathBuf> {
    let file_name = format!("{}.jsonl", session_id);

    let mut entries = fs::read_dir(projects_dir).await.ok()?;
    while let Ok(Some(project_entry)) = entries.next_entry().await {
        let candidate = project_entry.path().join(&file_name);
        if fs::metadata(&candidate).await.is_ok() {
            return Some(candidate);
        }
    }
    None
}
