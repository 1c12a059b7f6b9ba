// crates/server/src/broadcaster.rs
//! Fan-out hub for the client event stream.
//!
//! Sinks are registered under a `streaming_id`; publishing to an id
//! reaches only that id's sinks, while [`StreamBroadcaster::publish_global`]
//! reaches every sink regardless of id. `"global"` is a publish-time
//! wildcard, never a subscription key. Events are not buffered for absent
//! or departed subscribers.

use chrono::Utc;
use cui_core::{ConversationMessage, SessionRecord};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::debug;

/// Publish-time wildcard id: an event published here fans out to every
/// currently-attached sink across all streaming ids.
pub const GLOBAL_STREAMING_ID: &str = "global";

/// Liveness ping cadence. Pings are protocol comments, not events.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Per-sink channel depth. A sink that cannot keep up simply misses
/// frames; only a closed sink is evicted.
const SINK_BUFFER: usize = 64;

/// List-update flavor carried by [`StreamEvent::SessionListUpdate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListEventType {
    Created,
    Modified,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionListUpdate {
    pub session_id: String,
    pub event_type: ListEventType,
    pub metadata: SessionRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionContentUpdate {
    pub messages: Vec<ConversationMessage>,
}

/// Wire events pushed to stream clients as `data: <json>` frames.
///
/// Field casing is part of the stable wire format: the `connected`
/// handshake historically uses `streaming_id` while every other event is
/// camelCase.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Connected {
        streaming_id: String,
        timestamp: String,
    },
    #[serde(rename_all = "camelCase")]
    Closed {
        streaming_id: String,
        timestamp: String,
    },
    #[serde(rename_all = "camelCase")]
    IndexUpdate {
        session_id: String,
        timestamp: String,
    },
    SessionListUpdate { data: SessionListUpdate },
    SessionContentUpdate { data: SessionContentUpdate },
}

impl StreamEvent {
    pub fn connected(streaming_id: &str) -> Self {
        StreamEvent::Connected {
            streaming_id: streaming_id.to_string(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn closed(streaming_id: &str) -> Self {
        StreamEvent::Closed {
            streaming_id: streaming_id.to_string(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn index_update(session_id: &str) -> Self {
        StreamEvent::IndexUpdate {
            session_id: session_id.to_string(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn session_list_update(event_type: ListEventType, metadata: SessionRecord) -> Self {
        StreamEvent::SessionListUpdate {
            data: SessionListUpdate {
                session_id: metadata.session_id.clone(),
                event_type,
                metadata,
            },
        }
    }

    pub fn session_content_update(messages: Vec<ConversationMessage>) -> Self {
        StreamEvent::SessionContentUpdate {
            data: SessionContentUpdate { messages },
        }
    }
}

/// One frame on a sink channel: a JSON event or a comment-line ping.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    Event(StreamEvent),
    Heartbeat,
}

/// The fan-out hub. One instance per process, shared between the indexer
/// (publisher) and the stream route (subscriber registration).
pub struct StreamBroadcaster {
    sinks: Mutex<HashMap<String, Vec<mpsc::Sender<StreamFrame>>>>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
    // Handle to ourselves for the heartbeat task; weak so the ticker
    // never keeps the hub alive.
    self_weak: Weak<StreamBroadcaster>,
}

impl StreamBroadcaster {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            sinks: Mutex::new(HashMap::new()),
            heartbeat: Mutex::new(None),
            self_weak: weak.clone(),
        })
    }

    /// Register a sink under `streaming_id` and hand back its frame
    /// stream. The `connected` handshake is queued before registration;
    /// a sink that cannot even take the handshake is never registered.
    ///
    /// Starting the first sink also starts the heartbeat timer.
    pub fn add_client(&self, streaming_id: &str) -> mpsc::Receiver<StreamFrame> {
        let (tx, rx) = mpsc::channel(SINK_BUFFER);

        let hello = StreamFrame::Event(StreamEvent::connected(streaming_id));
        if tx.try_send(hello).is_err() {
            return rx;
        }

        self.sinks
            .lock()
            .unwrap()
            .entry(streaming_id.to_string())
            .or_default()
            .push(tx);

        debug!(streaming_id, "Stream client attached");
        self.ensure_heartbeat();
        rx
    }

    /// Send an event to the sinks of one streaming id. Publishing to the
    /// literal `"global"` id routes to [`Self::publish_global`]. No
    /// subscribers means the event is dropped, not buffered.
    pub fn broadcast(&self, streaming_id: &str, event: StreamEvent) {
        if streaming_id == GLOBAL_STREAMING_ID {
            self.publish_global(event);
            return;
        }

        {
            let mut sinks = self.sinks.lock().unwrap();
            if let Some(targets) = sinks.get_mut(streaming_id) {
                targets.retain(|tx| deliver(tx, StreamFrame::Event(event.clone())));
                if targets.is_empty() {
                    sinks.remove(streaming_id);
                }
            }
        }
        self.stop_heartbeat_if_idle();
    }

    /// Send an event to every attached sink across all streaming ids.
    pub fn publish_global(&self, event: StreamEvent) {
        {
            let mut sinks = self.sinks.lock().unwrap();
            for targets in sinks.values_mut() {
                targets.retain(|tx| deliver(tx, StreamFrame::Event(event.clone())));
            }
            sinks.retain(|_, targets| !targets.is_empty());
        }
        self.stop_heartbeat_if_idle();
    }

    /// Tear down one streaming id: emit a final `closed` event, then drop
    /// every sink registered under it (closing their channels ends the
    /// client streams).
    pub fn close_session(&self, streaming_id: &str) {
        let removed = self.sinks.lock().unwrap().remove(streaming_id);
        if let Some(targets) = removed {
            let bye = StreamEvent::closed(streaming_id);
            for tx in &targets {
                deliver(tx, StreamFrame::Event(bye.clone()));
            }
        }
        self.stop_heartbeat_if_idle();
    }

    /// Total attached sinks across all ids.
    pub fn client_count(&self) -> usize {
        self.sinks.lock().unwrap().values().map(Vec::len).sum()
    }

    /// Ping every sink, evicting the dead. Returns the surviving count.
    fn ping_all(&self) -> usize {
        let mut sinks = self.sinks.lock().unwrap();
        for targets in sinks.values_mut() {
            targets.retain(|tx| deliver(tx, StreamFrame::Heartbeat));
        }
        sinks.retain(|_, targets| !targets.is_empty());
        sinks.values().map(Vec::len).sum()
    }

    fn ensure_heartbeat(&self) {
        let mut heartbeat = self.heartbeat.lock().unwrap();
        let running = heartbeat.as_ref().map(|h| !h.is_finished()).unwrap_or(false);
        if running {
            return;
        }

        let hub = self.self_weak.clone();
        *heartbeat = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(hub) = hub.upgrade() else { break };
                if hub.ping_all() == 0 {
                    break;
                }
            }
        }));
    }

    fn stop_heartbeat_if_idle(&self) {
        if self.sinks.lock().unwrap().is_empty() {
            if let Some(handle) = self.heartbeat.lock().unwrap().take() {
                handle.abort();
            }
        }
    }
}

/// Push a frame into a sink. A full sink keeps its slot but misses the
/// frame; a closed sink is reported dead so the caller evicts it.
fn deliver(tx: &mpsc::Sender<StreamFrame>, frame: StreamFrame) -> bool {
    match tx.try_send(frame) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => true,
        Err(TrySendError::Closed(_)) => false,
    }
}
