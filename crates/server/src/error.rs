// crates/server/src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cui_core::ParseError;
use cui_db::StoreError;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Structured JSON error envelope returned by every API failure:
/// `{ code, message, status }`.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub status: u16,
}

/// API error taxonomy. Every failure crossing the HTTP boundary is
/// normalized to one of these; internal detail is logged, not returned,
/// except where the path is the error's subject.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Failed to read session history: {0}")]
    HistoryReadFailed(String),

    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("Session file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read conversation: {0}")]
    ConversationReadFailed(String),

    #[error("Failed to update session: {0}")]
    SessionUpdateFailed(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::HistoryReadFailed(_) => "HISTORY_READ_FAILED",
            ApiError::ConversationNotFound(_) => "CONVERSATION_NOT_FOUND",
            ApiError::FileNotFound(_) => "FILE_NOT_FOUND",
            ApiError::ConversationReadFailed(_) => "CONVERSATION_READ_FAILED",
            ApiError::SessionUpdateFailed(_) => "SESSION_UPDATE_FAILED",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::ConversationNotFound(_) | ApiError::FileNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::HistoryReadFailed(err.to_string())
    }
}

impl From<ParseError> for ApiError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::NotFound { path } => ApiError::FileNotFound(path),
            other => ApiError::ConversationReadFailed(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        // 404s name their subject; 500s keep internals in the log only.
        let message = match &self {
            ApiError::ConversationNotFound(id) => {
                tracing::warn!(session_id = %id, "Conversation not found");
                format!("No conversation found for session {}", id)
            }
            ApiError::FileNotFound(path) => {
                tracing::warn!(path = %path.display(), "Session file not found");
                format!("Session file not found: {}", path.display())
            }
            ApiError::HistoryReadFailed(detail) => {
                tracing::error!(error = %detail, "History read failed");
                "Failed to read session history".to_string()
            }
            ApiError::ConversationReadFailed(detail) => {
                tracing::error!(error = %detail, "Conversation read failed");
                "Failed to read conversation".to_string()
            }
            ApiError::SessionUpdateFailed(detail) => {
                tracing::error!(error = %detail, "Session update failed");
                "Failed to update session".to_string()
            }
        };

        let body = ErrorBody {
            code: self.code().to_string(),
            message,
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn extract(response: Response) -> (StatusCode, ErrorBody) {
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_conversation_not_found_envelope() {
        let (status, body) =
            extract(ApiError::ConversationNotFound("abc".to_string()).into_response()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.code, "CONVERSATION_NOT_FOUND");
        assert_eq!(body.status, 404);
        assert!(body.message.contains("abc"));
    }

    #[tokio::test]
    async fn test_file_not_found_exposes_its_subject_path() {
        let err = ApiError::FileNotFound(PathBuf::from("/projects/-p/x.jsonl"));
        let (status, body) = extract(err.into_response()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.code, "FILE_NOT_FOUND");
        assert!(body.message.contains("/projects/-p/x.jsonl"));
    }

    #[tokio::test]
    async fn test_internal_errors_hide_detail() {
        let err = ApiError::HistoryReadFailed("sqlite: disk I/O error at /secret/db".to_string());
        let (status, body) = extract(err.into_response()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.code, "HISTORY_READ_FAILED");
        assert!(!body.message.contains("/secret"));
    }

    #[test]
    fn test_parse_error_mapping() {
        let err: ApiError = ParseError::not_found("/p/x.jsonl").into();
        assert!(matches!(err, ApiError::FileNotFound(_)));

        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow disk");
        let err: ApiError = ParseError::io("/p/x.jsonl", io).into();
        assert!(matches!(err, ApiError::ConversationReadFailed(_)));
    }
}
