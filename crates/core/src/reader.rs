// crates/core/src/reader.rs
//! Conversation reader: parse a session file and rebuild the message tree.
//!
//! Parsing uses the same line-stream discipline as the scanner. The flat
//! entry log carries `uuid`/`parentUuid` links; [`build_message_chain`]
//! turns those links back into the pre-order conversation a client renders.
//! Nothing is cached across calls — callers needing caching layer it on top.

use crate::error::ParseError;
use crate::types::{is_tool_result_only, ConversationMessage, MessageType};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

/// Parse one JSONL line into a conversation message.
///
/// Returns `None` for non-conversation entries (summaries, progress lines,
/// malformed JSON, entries without a uuid).
pub fn parse_conversation_line(session_id: &str, line: &str) -> Option<ConversationMessage> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let value: serde_json::Value = serde_json::from_str(line).ok()?;

    let message_type = match value.get("type").and_then(|t| t.as_str()) {
        Some("user") => MessageType::User,
        Some("assistant") => MessageType::Assistant,
        Some("system") => MessageType::System,
        _ => return None,
    };

    let uuid = value.get("uuid").and_then(|v| v.as_str())?.to_string();

    Some(ConversationMessage {
        uuid,
        parent_uuid: value
            .get("parentUuid")
            .and_then(|v| v.as_str())
            .map(String::from),
        session_id: session_id.to_string(),
        message_type,
        timestamp: value
            .get("timestamp")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        is_sidechain: value
            .get("isSidechain")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        cwd: value.get("cwd").and_then(|v| v.as_str()).map(String::from),
        duration_ms: value.get("durationMs").and_then(|v| v.as_u64()),
        message: value
            .get("message")
            .cloned()
            .unwrap_or(serde_json::Value::Null),
    })
}

/// Stream-parse a session file, retaining `user` and `assistant` entries.
pub async fn parse_conversation(
    file_path: &Path,
) -> Result<Vec<ConversationMessage>, ParseError> {
    let file = File::open(file_path)
        .await
        .map_err(|e| ParseError::io(file_path, e))?;

    let session_id = file_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let reader = BufReader::new(file);
    let mut lines = reader.lines();
    let mut messages = Vec::new();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| ParseError::io(file_path, e))?
    {
        match parse_conversation_line(&session_id, &line) {
            Some(msg) if msg.message_type != MessageType::System => messages.push(msg),
            Some(_) => {}
            None => {
                debug!("Skipping non-conversation line in {:?}", file_path);
            }
        }
    }

    Ok(messages)
}

/// Rebuild the conversation order from the flat entry log.
///
/// The head is the message with no parent (or whose parent is not in the
/// set); traversal is depth-first, children visited in ascending timestamp
/// order, output in pre-order. Messages not reached from the head are
/// appended at the end sorted by timestamp. A visited set guards against
/// parent cycles, which should not occur in well-formed files.
pub fn build_message_chain(messages: Vec<ConversationMessage>) -> Vec<ConversationMessage> {
    if messages.is_empty() {
        return messages;
    }

    let uuids: HashSet<&str> = messages.iter().map(|m| m.uuid.as_str()).collect();

    // children[parent_uuid] -> indices, kept in ascending timestamp order
    let mut children: HashMap<&str, Vec<usize>> = HashMap::new();
    let mut roots: Vec<usize> = Vec::new();
    for (i, msg) in messages.iter().enumerate() {
        match msg.parent_uuid.as_deref() {
            Some(parent) if uuids.contains(parent) && parent != msg.uuid => {
                children.entry(parent).or_default().push(i);
            }
            _ => roots.push(i),
        }
    }
    for indices in children.values_mut() {
        indices.sort_by(|&a, &b| messages[a].timestamp.cmp(&messages[b].timestamp));
    }
    roots.sort_by(|&a, &b| messages[a].timestamp.cmp(&messages[b].timestamp));

    let mut visited: HashSet<usize> = HashSet::new();
    let mut order: Vec<usize> = Vec::with_capacity(messages.len());

    // Pre-order walk from the head; an explicit stack keeps deep chains safe.
    if let Some(&head) = roots.first() {
        let mut stack = vec![head];
        while let Some(i) = stack.pop() {
            if !visited.insert(i) {
                continue;
            }
            order.push(i);
            if let Some(kids) = children.get(messages[i].uuid.as_str()) {
                for &kid in kids.iter().rev() {
                    if !visited.contains(&kid) {
                        stack.push(kid);
                    }
                }
            }
        }
    }

    // Orphans: anything unreached, appended in timestamp order.
    let mut orphans: Vec<usize> = (0..messages.len())
        .filter(|i| !visited.contains(i))
        .collect();
    orphans.sort_by(|&a, &b| messages[a].timestamp.cmp(&messages[b].timestamp));
    order.extend(orphans);

    let mut by_index: Vec<Option<ConversationMessage>> =
        messages.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|i| by_index[i].take())
        .collect()
}

/// Drop user entries that are pure tool results — they carry no
/// conversational content and are not shown in the detail view.
pub fn filter_tool_results(messages: Vec<ConversationMessage>) -> Vec<ConversationMessage> {
    messages
        .into_iter()
        .filter(|m| {
            if m.message_type != MessageType::User {
                return true;
            }
            let content = m.message.get("content").unwrap_or(&serde_json::Value::Null);
            !is_tool_result_only(content)
        })
        .collect()
}
