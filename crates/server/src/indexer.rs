// crates/server/src/indexer.rs
//! History indexer: scan → diff → parse → store → broadcast pipeline.
//!
//! One instance per process. `start()` performs the initial full scan in
//! the background, then installs the filesystem watcher; events received
//! while the scan is still running are re-observed afterwards via the
//! mtime comparison. Incremental updates are debounced per file and
//! applied as single-row batches, followed by stream notifications.
//!
//! The indexer only ever writes indexed fields and never deletes rows —
//! a vanished file surfaces at read time, not here.

use crate::broadcaster::{ListEventType, StreamBroadcaster, StreamEvent};
use crate::file_cursor::FileCursor;
use crate::watcher::start_watcher;
use cui_core::discovery::{self, decode_project_dir_name, is_session_file};
use cui_core::reader::parse_conversation_line;
use cui_core::scanner::extract_session_metadata;
use cui_core::{ConversationMessage, IndexedMetadata, MessageType};
use cui_db::{Database, UPSERT_BATCH_SIZE};
use notify::RecommendedWatcher;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Quiet window after the last filesystem event before a file is rescanned.
pub const DEBOUNCE: Duration = Duration::from_millis(200);

/// Slack applied to the mtime comparison during the full scan, covering
/// filesystems with coarse timestamp granularity.
pub const MTIME_SLACK_MS: i64 = 1_000;

/// Watcher event channel depth.
const WATCH_CHANNEL_CAPACITY: usize = 256;

pub struct HistoryIndexer {
    db: Database,
    broadcaster: Arc<StreamBroadcaster>,
    projects_dir: PathBuf,
    is_running: AtomicBool,
    should_stop: AtomicBool,
    watcher: Mutex<Option<RecommendedWatcher>>,
    /// Per-file debounce timers. Touched by the event loop and the timers
    /// themselves, hence the lock.
    pending: Mutex<HashMap<PathBuf, JoinHandle<()>>>,
    /// Per-file byte cursors feeding `session_content_update`.
    cursors: tokio::sync::Mutex<HashMap<PathBuf, FileCursor>>,
    // Handle to ourselves for background tasks and debounce timers.
    self_weak: Weak<HistoryIndexer>,
}

impl HistoryIndexer {
    pub fn new(
        db: Database,
        broadcaster: Arc<StreamBroadcaster>,
        projects_dir: PathBuf,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            db,
            broadcaster,
            projects_dir,
            is_running: AtomicBool::new(false),
            should_stop: AtomicBool::new(false),
            watcher: Mutex::new(None),
            pending: Mutex::new(HashMap::new()),
            cursors: tokio::sync::Mutex::new(HashMap::new()),
            self_weak: weak.clone(),
        })
    }

    /// Start the indexer. Idempotent: a second call while running logs a
    /// warning and returns. Never blocks the caller — the scan and the
    /// watcher live on background tasks.
    pub fn start(&self) {
        if self.is_running.swap(true, Ordering::SeqCst) {
            warn!("History indexer already running");
            return;
        }
        self.should_stop.store(false, Ordering::SeqCst);

        let Some(indexer) = self.self_weak.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            let indexed = indexer.run_full_scan().await;
            info!(indexed, "Initial session scan complete");

            if indexer.should_stop.load(Ordering::SeqCst) {
                return;
            }

            let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
            match start_watcher(&indexer.projects_dir, tx) {
                Ok(watcher) => {
                    *indexer.watcher.lock().unwrap() = Some(watcher);
                    indexer.run_event_loop(rx).await;
                }
                Err(e) => {
                    warn!("Failed to install file watcher: {}", e);
                }
            }
        });
    }

    /// Stop the indexer: closes the watcher and cancels pending debounce
    /// timers. A scan in flight finishes its current file and exits at
    /// the next file boundary.
    pub fn stop(&self) {
        self.should_stop.store(true, Ordering::SeqCst);

        // Dropping the watcher also drops the event sender, which ends
        // the event loop.
        *self.watcher.lock().unwrap() = None;

        for (_, timer) in self.pending.lock().unwrap().drain() {
            timer.abort();
        }

        self.is_running.store(false, Ordering::SeqCst);
    }

    /// Walk the projects tree once, scanning files whose mtime moved past
    /// the stored `last_scanned_at_ms` (with slack), and upsert results in
    /// batches. Returns the number of rows written.
    pub async fn run_full_scan(&self) -> usize {
        let files = match discovery::list_session_files(&self.projects_dir).await {
            Ok(files) => files,
            Err(e) => {
                warn!("Initial scan skipped: {}", e);
                return 0;
            }
        };

        let scan_states = match self.db.get_all_scan_states().await {
            Ok(states) => states,
            Err(e) => {
                warn!("Could not load scan states, rescanning everything: {}", e);
                HashMap::new()
            }
        };

        let mut batch: Vec<IndexedMetadata> = Vec::new();
        let mut indexed = 0usize;

        for file in files {
            if self.should_stop.load(Ordering::SeqCst) {
                break;
            }

            self.seed_cursor(&file.path).await;

            let session_id = file
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();

            // Cheap re-runs: skip files the store has already seen at
            // (or within a second of) this mtime.
            if let Some(&stored) = scan_states.get(&session_id) {
                if stored >= file.mtime_ms - MTIME_SLACK_MS {
                    continue;
                }
            }

            match extract_session_metadata(&file.path, file.mtime_ms).await {
                Ok(Some(meta)) => {
                    batch.push(with_project_fallback(meta, &file.project_dir));
                    if batch.len() >= UPSERT_BATCH_SIZE {
                        indexed += self.flush(&mut batch).await;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Skipping unreadable session file {:?}: {}", file.path, e);
                }
            }
        }

        indexed += self.flush(&mut batch).await;
        indexed
    }

    /// Attempt to write the pending batch. On failure the batch is kept
    /// so the rows ride along with the next flush attempt.
    async fn flush(&self, batch: &mut Vec<IndexedMetadata>) -> usize {
        if batch.is_empty() {
            return 0;
        }
        match self.db.upsert_indexed_batch(batch).await {
            Ok(()) => {
                let n = batch.len();
                batch.clear();
                n
            }
            Err(e) => {
                warn!(
                    "Failed to store batch of {} sessions, will retry: {}",
                    batch.len(),
                    e
                );
                0
            }
        }
    }

    async fn run_event_loop(&self, mut rx: mpsc::Receiver<PathBuf>) {
        while let Some(path) = rx.recv().await {
            if self.should_stop.load(Ordering::SeqCst) {
                break;
            }
            self.schedule_debounced(path);
        }
    }

    /// Reset the debounce timer for a file. Bursts of events collapse
    /// into a single scan once the file has been quiet for [`DEBOUNCE`].
    fn schedule_debounced(&self, path: PathBuf) {
        if !is_session_file(&path) {
            return;
        }
        let Some(indexer) = self.self_weak.upgrade() else {
            return;
        };

        let mut pending = self.pending.lock().unwrap();
        if let Some(timer) = pending.remove(&path) {
            timer.abort();
        }

        let key = path.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(DEBOUNCE).await;
            indexer.pending.lock().unwrap().remove(&key);
            if indexer.should_stop.load(Ordering::SeqCst) {
                return;
            }
            indexer.index_changed_file(&key).await;
        });
        pending.insert(path, timer);
    }

    /// Incremental path: rescan one file, upsert it, and notify streams.
    ///
    /// A file that vanished before its timer fired is dropped without
    /// error. Store failures are logged; the next event retries.
    pub async fn index_changed_file(&self, path: &Path) {
        let Some(mtime_ms) = discovery::file_mtime_ms(path).await else {
            debug!("Session file disappeared before rescan: {:?}", path);
            return;
        };

        let project_dir = path
            .parent()
            .and_then(|p| p.file_name())
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        let meta = match extract_session_metadata(path, mtime_ms).await {
            Ok(Some(meta)) => with_project_fallback(meta, &project_dir),
            Ok(None) => return,
            Err(e) => {
                warn!("Failed to rescan {:?}: {}", path, e);
                return;
            }
        };

        let session_id = meta.session_id.clone();
        let existed = matches!(self.db.find_session(&session_id).await, Ok(Some(_)));

        if let Err(e) = self.db.upsert_indexed_batch(std::slice::from_ref(&meta)).await {
            warn!("Failed to store re-indexed session {}: {}", session_id, e);
            return;
        }

        self.broadcaster
            .publish_global(StreamEvent::index_update(&session_id));

        match self.db.find_session(&session_id).await {
            Ok(Some(record)) => {
                let event_type = if existed {
                    ListEventType::Modified
                } else {
                    ListEventType::Created
                };
                self.broadcaster
                    .publish_global(StreamEvent::session_list_update(event_type, record));
            }
            Ok(None) => {}
            Err(e) => warn!("Could not reload session {} for notification: {}", session_id, e),
        }

        self.push_appended_messages(path, &session_id).await;
    }

    /// Read lines appended since the previous look and push the new
    /// user/assistant messages on the session's own channel.
    async fn push_appended_messages(&self, path: &Path, session_id: &str) {
        let mut cursors = self.cursors.lock().await;
        let cursor = cursors
            .entry(path.to_path_buf())
            .or_insert_with(|| FileCursor::new(path.to_path_buf()));

        let lines = match cursor.read_new_lines().await {
            Ok(lines) => lines,
            Err(e) => {
                debug!("Could not tail {:?}: {}", path, e);
                return;
            }
        };
        drop(cursors);

        let messages: Vec<ConversationMessage> = lines
            .iter()
            .filter_map(|line| parse_conversation_line(session_id, line))
            .filter(|m| m.message_type != MessageType::System && !m.is_sidechain)
            .collect();

        if messages.is_empty() {
            return;
        }

        self.broadcaster.broadcast(
            &format!("session-{}", session_id),
            StreamEvent::session_content_update(messages),
        );
    }

    /// Seed the tail cursor at end-of-file so the initial scan never
    /// re-announces historical content.
    async fn seed_cursor(&self, path: &Path) {
        let mut cursors = self.cursors.lock().await;
        if cursors.contains_key(path) {
            return;
        }
        if let Ok(cursor) = FileCursor::new_at_end(path.to_path_buf()).await {
            cursors.insert(path.to_path_buf(), cursor);
        }
    }
}

/// The authoritative project path is the first `cwd` seen inside the
/// file; the folder-name heuristic only fills in when no `cwd` exists.
fn with_project_fallback(mut meta: IndexedMetadata, project_dir: &str) -> IndexedMetadata {
    if meta.project_path.is_none() && !project_dir.is_empty() {
        meta.project_path = Some(decode_project_dir_name(project_dir));
    }
    meta
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_fallback_only_when_cwd_absent() {
        let meta = IndexedMetadata {
            session_id: "s".into(),
            summary: None,
            project_path: Some("/real/cwd".into()),
            file_path: "/x/s.jsonl".into(),
            message_count: 1,
            total_duration_ms: 0,
            model: "Unknown".into(),
            first_timestamp: None,
            last_timestamp: None,
            last_scanned_at_ms: 0,
        };
        let kept = with_project_fallback(meta.clone(), "-Users-foo");
        assert_eq!(kept.project_path.as_deref(), Some("/real/cwd"));

        let mut without = meta;
        without.project_path = None;
        let derived = with_project_fallback(without, "-Users-foo");
        assert_eq!(derived.project_path.as_deref(), Some("/Users/foo"));
    }
}
