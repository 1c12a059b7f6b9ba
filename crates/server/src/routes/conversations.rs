// crates/server/src/routes/conversations.rs
//! Conversation list, detail, and mutation endpoints.
//!
//! The list endpoint is a pure store query and never opens a session
//! file; per-session tool metrics are deliberately absent from list
//! responses. Detail reads resolve the file through the index-cached
//! path first and fall back to a directory scan.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use cui_core::discovery::find_session_file;
use cui_core::reader::{build_message_chain, filter_tool_results, parse_conversation};
use cui_core::{ConversationMessage, SessionRecord};
use cui_db::{ListQuery, SessionUpdate, SortBy, SortOrder};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/conversations", get(list_conversations))
        .route("/conversations/archive-all", post(archive_all))
        .route(
            "/conversations/{id}",
            get(get_conversation)
                .put(update_session)
                .delete(delete_session),
        )
        .route("/conversations/{id}/metadata", get(get_metadata))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    project_path: Option<String>,
    archived: Option<bool>,
    pinned: Option<bool>,
    has_continuation: Option<bool>,
    /// `createdAt` or `updatedAt` (default).
    sort_by: Option<String>,
    /// `asc` or `desc` (default).
    order: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl ListParams {
    fn into_query(self) -> ListQuery {
        ListQuery {
            project_path: self.project_path,
            archived: self.archived,
            pinned: self.pinned,
            has_continuation: self.has_continuation,
            sort_by: match self.sort_by.as_deref() {
                Some("createdAt") => SortBy::CreatedAt,
                _ => SortBy::UpdatedAt,
            },
            order: match self.order.as_deref() {
                Some("asc") => SortOrder::Asc,
                _ => SortOrder::Desc,
            },
            limit: self.limit,
            offset: self.offset,
        }
    }
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(Deserialize))]
pub struct ListResponse {
    pub conversations: Vec<SessionRecord>,
    pub total: i64,
}

/// GET /api/conversations -- filtered, paginated session listing.
async fn list_conversations(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<ListResponse>> {
    let (conversations, total) = state.db.list_sessions(&params.into_query()).await?;
    Ok(Json(ListResponse {
        conversations,
        total,
    }))
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(Deserialize))]
pub struct ConversationResponse {
    pub messages: Vec<ConversationMessage>,
}

/// GET /api/conversations/{id} -- full reconstructed conversation.
async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ConversationResponse>> {
    let path = resolve_session_file(&state, &id).await?;
    let entries = parse_conversation(&path).await?;
    let messages = filter_tool_results(build_message_chain(entries));
    Ok(Json(ConversationResponse { messages }))
}

/// Locate the session's JSONL file: index-cached path first, directory
/// scan second. The error distinguishes "never heard of it" from "the
/// file we indexed is gone".
async fn resolve_session_file(state: &AppState, session_id: &str) -> ApiResult<PathBuf> {
    let stored = state.db.get_session_file_path(session_id).await?;

    match stored {
        Some(p) => {
            let path = PathBuf::from(&p);
            if tokio::fs::metadata(&path).await.is_ok() {
                return Ok(path);
            }
            match find_session_file(&state.projects_dir, session_id).await {
                Some(found) => Ok(found),
                None => Err(ApiError::FileNotFound(path)),
            }
        }
        None => find_session_file(&state.projects_dir, session_id)
            .await
            .ok_or_else(|| ApiError::ConversationNotFound(session_id.to_string())),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MetadataResponse {
    summary: Option<String>,
    project_path: Option<String>,
    model: String,
    total_duration_ms: i64,
}

/// GET /api/conversations/{id}/metadata -- store read only; `null` when
/// the session is unknown.
async fn get_metadata(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let record = state.db.find_session(&id).await?;
    let body = match record {
        Some(r) => serde_json::to_value(MetadataResponse {
            summary: r.summary,
            project_path: r.project_path,
            model: r.model,
            total_duration_ms: r.total_duration_ms,
        })
        .unwrap_or_default(),
        None => serde_json::Value::Null,
    };
    Ok(Json(body))
}

/// PUT /api/conversations/{id} -- merge user-preference fields.
async fn update_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(patch): Json<SessionUpdate>,
) -> ApiResult<Json<SessionRecord>> {
    let record = state
        .db
        .update_session(&id, &patch)
        .await
        .map_err(|e| ApiError::SessionUpdateFailed(e.to_string()))?;
    Ok(Json(record))
}

/// DELETE /api/conversations/{id} -- remove the index row. The session
/// file on disk is never touched.
async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let deleted = state
        .db
        .delete_session(&id)
        .await
        .map_err(|e| ApiError::SessionUpdateFailed(e.to_string()))?;
    if !deleted {
        return Err(ApiError::ConversationNotFound(id));
    }
    Ok(Json(serde_json::json!({ "success": true })))
}

/// POST /api/conversations/archive-all -- archive every unarchived row.
async fn archive_all(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<serde_json::Value>> {
    let archived = state
        .db
        .archive_all_sessions()
        .await
        .map_err(|e| ApiError::SessionUpdateFailed(e.to_string()))?;
    Ok(Json(serde_json::json!({ "archived": archived })))
}
