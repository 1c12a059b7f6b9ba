// crates/server/src/lib.rs
//! cui server library.
//!
//! Axum-based HTTP server over the session index: list/detail reads,
//! user-preference mutations, and the SSE update stream, with the
//! history indexer keeping the store current in the background.

pub mod broadcaster;
pub mod error;
pub mod file_cursor;
pub mod indexer;
pub mod routes;
pub mod state;
pub mod watcher;

pub use broadcaster::{StreamBroadcaster, StreamEvent, GLOBAL_STREAMING_ID};
pub use error::{ApiError, ApiResult, ErrorBody};
pub use indexer::HistoryIndexer;
pub use routes::api_routes;
pub use state::AppState;

use axum::http::HeaderValue;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create a CORS layer that only allows localhost origins.
///
/// Session transcripts are sensitive; a malicious website must not be
/// able to read them with a cross-origin `fetch()` to the local port.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            |origin: &HeaderValue, _req_parts: &axum::http::request::Parts| {
                if let Ok(origin) = origin.to_str() {
                    origin.starts_with("http://localhost:")
                        || origin.starts_with("http://127.0.0.1:")
                        || origin == "http://localhost"
                        || origin == "http://127.0.0.1"
                } else {
                    false
                }
            },
        ))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Create the Axum application with all routes and middleware.
pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(api_routes(state))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}
