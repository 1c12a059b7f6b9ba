// crates/core/src/types.rs
use serde::{Deserialize, Serialize};

/// Schema marker written into every session row. Bumped when the set of
/// indexed columns changes meaning.
pub const SESSION_SCHEMA_VERSION: i64 = 4;

/// Model name recorded when a session file never names one.
pub const UNKNOWN_MODEL: &str = "Unknown";

/// One row of the session index. The primary key is `session_id` (the
/// filename stem of the session's JSONL file, typically a UUID).
///
/// Fields split into two provenance groups: user-preference fields are
/// written only through the update API and never by the indexer; indexed
/// fields are written only by the indexer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,

    // User-preference fields
    #[serde(default)]
    pub custom_name: String,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub archived: bool,
    /// Absent means "no continuation"; the empty string is normalized away.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continuation_session_id: Option<String>,
    #[serde(default)]
    pub initial_commit_head: String,
    #[serde(default = "default_permission_mode")]
    pub permission_mode: String,

    // Indexed fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    pub message_count: i64,
    pub total_duration_ms: i64,
    pub model: String,
    pub last_scanned_at_ms: i64,

    // Bookkeeping
    pub version: i64,
    pub created_at: String,
    pub updated_at: String,
}

fn default_permission_mode() -> String {
    "default".to_string()
}

impl SessionRecord {
    /// A fresh row with default user preferences, used by get-or-initialize.
    pub fn empty(session_id: impl Into<String>, now: impl Into<String>) -> Self {
        let now = now.into();
        Self {
            session_id: session_id.into(),
            custom_name: String::new(),
            pinned: false,
            archived: false,
            continuation_session_id: None,
            initial_commit_head: String::new(),
            permission_mode: default_permission_mode(),
            summary: None,
            project_path: None,
            file_path: None,
            message_count: 0,
            total_duration_ms: 0,
            model: UNKNOWN_MODEL.to_string(),
            last_scanned_at_ms: 0,
            version: SESSION_SCHEMA_VERSION,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// Derived, cacheable view of one session file, produced by the scanner
/// and consumed by the indexer. Same shape as the indexed-field subset of
/// [`SessionRecord`].
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedMetadata {
    pub session_id: String,
    pub summary: Option<String>,
    pub project_path: Option<String>,
    pub file_path: String,
    pub message_count: i64,
    pub total_duration_ms: i64,
    pub model: String,
    pub first_timestamp: Option<String>,
    pub last_timestamp: Option<String>,
    /// Source file's mtime (ms since epoch) at the moment of the scan.
    pub last_scanned_at_ms: i64,
}

/// Role of a conversation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    User,
    Assistant,
    System,
}

/// One entry of a reconstructed conversation.
///
/// The `message` payload is kept opaque: either a plain string or an
/// object whose `content` is a string or a list of typed blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    pub uuid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_uuid: Option<String>,
    pub session_id: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub timestamp: String,
    #[serde(default)]
    pub is_sidechain: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub message: serde_json::Value,
}

/// Typed content block inside a structured message payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
        #[serde(default)]
        input: Option<serde_json::Value>,
    },
    ToolResult {
        #[serde(default)]
        content: Option<serde_json::Value>,
    },
    Thinking {
        #[serde(default)]
        thinking: Option<String>,
    },
    #[serde(other)]
    Other,
}

/// Extract the user-visible text of a `message.content` value: the string
/// itself, or the concatenation of `type == "text"` blocks.
pub fn extract_text_content(content: &serde_json::Value) -> String {
    match content {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(blocks) => blocks
            .iter()
            .filter_map(|b| match serde_json::from_value(b.clone()) {
                Ok(ContentBlock::Text { text }) => Some(text),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

/// True when a `message.content` value consists entirely of tool-result
/// blocks — the shape of the synthetic user entries the agent writes after
/// running a tool.
pub fn is_tool_result_only(content: &serde_json::Value) -> bool {
    match content {
        serde_json::Value::Array(blocks) if !blocks.is_empty() => blocks.iter().all(|b| {
            matches!(
                serde_json::from_value(b.clone()),
                Ok(ContentBlock::ToolResult { .. })
            )
        }),
        _ => false,
    }
}
