//! Filesystem watcher for session JSONL files.
//!
//! Watches the projects directory recursively and forwards the paths of
//! created/modified session files into a channel. Filtering (".jsonl",
//! no `agent-` logs) happens here so the indexer only ever sees
//! candidate files. Removals are deliberately not forwarded — file
//! absence never deletes an index row.

use cui_core::discovery::is_session_file;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Start a recursive watcher on `projects_dir`.
///
/// Returns the watcher handle, which must be kept alive for the duration
/// of monitoring — dropping it stops the watch. If the directory does
/// not exist yet, the watcher is returned idle with a warning.
pub fn start_watcher(
    projects_dir: &Path,
    tx: mpsc::Sender<PathBuf>,
) -> notify::Result<RecommendedWatcher> {
    let mut watcher =
        notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                        return;
                    }
                    for path in event.paths.into_iter().filter(|p| is_session_file(p)) {
                        // Best-effort send; a full or closed channel drops the event
                        let _ = tx.try_send(path);
                    }
                }
                Err(e) => {
                    error!("File watcher error: {}", e);
                }
            }
        })?;

    if projects_dir.exists() {
        watcher.watch(projects_dir, RecursiveMode::Recursive)?;
        info!("Watching {} for session changes", projects_dir.display());
    } else {
        warn!(
            "Projects directory does not exist: {}; watcher idle",
            projects_dir.display()
        );
    }

    Ok(watcher)
}
