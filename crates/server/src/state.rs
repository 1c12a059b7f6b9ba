// crates/server/src/state.rs
//! Application state for the Axum server.

use crate::broadcaster::StreamBroadcaster;
use cui_db::Database;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Shared application state accessible from all route handlers.
///
/// The single `Database` handle is owned here and injected into the
/// indexer by `main` — there is no process-global store.
pub struct AppState {
    /// Server start time for uptime reporting.
    pub start_time: Instant,
    /// Metadata store handle.
    pub db: Database,
    /// SSE fan-out hub shared with the indexer.
    pub broadcaster: Arc<StreamBroadcaster>,
    /// Root of the on-disk session archive.
    pub projects_dir: PathBuf,
}

impl AppState {
    /// Create a new application state wrapped in an Arc for sharing.
    pub fn new(
        db: Database,
        broadcaster: Arc<StreamBroadcaster>,
        projects_dir: PathBuf,
    ) -> Arc<Self> {
        Arc::new(Self {
            start_time: Instant::now(),
            db,
            broadcaster,
            projects_dir,
        })
    }

    /// Server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
