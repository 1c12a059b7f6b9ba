// crates/server/src/routes/mod.rs
//! API route handlers for the cui server.

pub mod conversations;
pub mod health;
pub mod stream;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined API router with all routes under the /api prefix.
///
/// Routes:
/// - GET    /api/health                          - Health check + store stats
/// - GET    /api/conversations                   - List sessions
/// - GET    /api/conversations/{id}              - Conversation detail
/// - GET    /api/conversations/{id}/metadata     - Store-only metadata
/// - PUT    /api/conversations/{id}              - Update user preferences
/// - DELETE /api/conversations/{id}              - Delete a session row
/// - POST   /api/conversations/archive-all       - Archive everything
/// - GET    /api/stream/{streaming_id}           - SSE event stream
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", health::router())
        .nest("/api", conversations::router())
        .nest("/api", stream::router())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcaster::StreamBroadcaster;

    #[tokio::test]
    async fn test_api_routes_creation() {
        let db = cui_db::Database::new_in_memory().await.expect("in-memory DB");
        let state = AppState::new(db, StreamBroadcaster::new(), "/tmp/projects".into());
        let _router = api_routes(state);
    }
}
