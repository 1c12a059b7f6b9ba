// crates/server/src/routes/health.rs
//! Health check endpoint.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::{extract::State, routing::get, Json, Router};
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}

/// GET /api/health -- liveness plus store statistics.
async fn health(State(state): State<Arc<AppState>>) -> ApiResult<Json<serde_json::Value>> {
    let stats = state.db.stats().await?;
    Ok(Json(serde_json::json!({
        "status": "ok",
        "uptimeSecs": state.uptime_secs(),
        "store": stats,
    })))
}
