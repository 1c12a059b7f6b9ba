// crates/server/src/routes/stream.rs
//! Long-lived SSE endpoint backed by the stream broadcaster.
//!
//! Wire framing per event: `data: <json>\n\n`. Liveness pings surface as
//! comment lines (`: heartbeat`), invisible to EventSource consumers.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::get,
    Router,
};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::broadcaster::StreamFrame;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/stream/{streaming_id}", get(attach_stream))
}

/// GET /api/stream/{streaming_id} -- attach a client sink.
///
/// Clients pass a concrete streaming id; the literal `"global"` works
/// too and simply receives the global fan-out (every attached sink gets
/// global events regardless of id).
async fn attach_stream(
    State(state): State<Arc<AppState>>,
    Path(streaming_id): Path<String>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.broadcaster.add_client(&streaming_id);

    let stream = ReceiverStream::new(rx).map(|frame| {
        Ok(match frame {
            StreamFrame::Event(event) => Event::default()
                .data(serde_json::to_string(&event).unwrap_or_default()),
            StreamFrame::Heartbeat => Event::default().comment("heartbeat"),
        })
    });

    Sse::new(stream)
}
