// crates/core/src/scanner.rs
//! Streaming metadata scanner for session JSONL files.
//!
//! Reads a session file line by line and derives an [`IndexedMetadata`]
//! record without materializing the file. Malformed lines are tolerated
//! silently — the writing process may be mid-append, so a truncated tail
//! is expected, not fatal.

use crate::error::ParseError;
use crate::types::{extract_text_content, IndexedMetadata, UNKNOWN_MODEL};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

/// Maximum length of the fallback summary derived from the first user
/// message when no summary entry exists in the file.
pub const FALLBACK_SUMMARY_MAX_CHARS: usize = 100;

/// Scan a session file and derive its index metadata.
///
/// `mtime_ms` is the file's modification time at the moment the caller
/// decided to scan; it is recorded verbatim as `last_scanned_at_ms`.
///
/// Returns `Ok(None)` when the file yields zero user/assistant messages
/// and no summary entry — such files produce no index row at all.
///
/// Per-line semantics:
/// - entries with `isSidechain: true` are skipped wholesale
/// - only `user` and `assistant` entries count toward `message_count`,
///   timestamps, model, and duration
/// - `summary` entries set the session summary
/// - the first non-empty `cwd` becomes the project path
/// - the first non-empty `message.model` becomes the model
/// - `durationMs` is summed across user/assistant entries
pub async fn extract_session_metadata(
    file_path: &Path,
    mtime_ms: i64,
) -> Result<Option<IndexedMetadata>, ParseError> {
    let file = File::open(file_path)
        .await
        .map_err(|e| ParseError::io(file_path, e))?;

    let session_id = file_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    let mut message_count: i64 = 0;
    let mut total_duration_ms: i64 = 0;
    let mut summary: Option<String> = None;
    let mut project_path: Option<String> = None;
    let mut model: Option<String> = None;
    let mut first_timestamp: Option<String> = None;
    let mut last_timestamp: Option<String> = None;
    let mut first_user_text: Option<String> = None;
    let mut line_number: usize = 0;

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| ParseError::io(file_path, e))?
    {
        line_number += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let value: serde_json::Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                debug!(
                    "Skipping malformed JSON at line {} in {:?}: {}",
                    line_number, file_path, e
                );
                continue;
            }
        };

        if value.get("isSidechain").and_then(|v| v.as_bool()) == Some(true) {
            continue;
        }

        let entry_type = match value.get("type").and_then(|t| t.as_str()) {
            Some(t) => t,
            None => continue,
        };

        match entry_type {
            "summary" => {
                if let Some(s) = value.get("summary").and_then(|v| v.as_str()) {
                    if !s.is_empty() {
                        summary = Some(s.to_string());
                    }
                }
            }
            "user" | "assistant" => {
                message_count += 1;

                if let Some(ts) = value.get("timestamp").and_then(|v| v.as_str()) {
                    if first_timestamp.is_none() {
                        first_timestamp = Some(ts.to_string());
                    }
                    last_timestamp = Some(ts.to_string());
                }

                if project_path.is_none() {
                    if let Some(cwd) = value.get("cwd").and_then(|v| v.as_str()) {
                        if !cwd.is_empty() {
                            project_path = Some(cwd.to_string());
                        }
                    }
                }

                if model.is_none() {
                    if let Some(m) = value
                        .get("message")
                        .and_then(|m| m.get("model"))
                        .and_then(|m| m.as_str())
                    {
                        if !m.is_empty() {
                            model = Some(m.to_string());
                        }
                    }
                }

                if let Some(ms) = value.get("durationMs").and_then(|v| v.as_i64()) {
                    total_duration_ms += ms;
                }

                if entry_type == "user" && first_user_text.is_none() {
                    if let Some(content) = value.get("message").and_then(|m| m.get("content")) {
                        let text = extract_text_content(content);
                        if !text.trim().is_empty() {
                            first_user_text = Some(text);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    // Files with no visible messages and no summary yield no index row.
    if message_count == 0 && summary.is_none() {
        return Ok(None);
    }

    let summary = summary.or_else(|| first_user_text.as_deref().map(fallback_summary));

    Ok(Some(IndexedMetadata {
        session_id,
        summary,
        project_path,
        file_path: file_path.to_string_lossy().to_string(),
        message_count,
        total_duration_ms,
        model: model.unwrap_or_else(|| UNKNOWN_MODEL.to_string()),
        first_timestamp,
        last_timestamp,
        last_scanned_at_ms: mtime_ms,
    }))
}

/// Flatten and truncate a user message into a list-view summary:
/// newlines become spaces, text longer than [`FALLBACK_SUMMARY_MAX_CHARS`]
/// is cut and suffixed with `...`.
pub fn fallback_summary(text: &str) -> String {
    let flat = text.replace(['\n', '\r'], " ");
    let flat = flat.trim();
    if flat.chars().count() > FALLBACK_SUMMARY_MAX_CHARS {
        let truncated: String = flat.chars().take(FALLBACK_SUMMARY_MAX_CHARS).collect();
        format!("{}...", truncated)
    } else {
        flat.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_session(dir: &TempDir, name: &str, lines: &[&str]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(f, "{}", line).unwrap();
        }
        path
    }

    #[tokio::test]
    async fn test_scan_fresh_session() {
        let dir = TempDir::new().unwrap();
        let path = write_session(
            &dir,
            "a1b2.jsonl",
            &[
                r#"{"type":"user","uuid":"u1","timestamp":"2024-01-01T00:00:00Z","cwd":"/p","message":{"content":"hi"},"durationMs":100}"#,
                r#"{"type":"assistant","uuid":"a1","parentUuid":"u1","timestamp":"2024-01-01T00:00:01Z","message":{"model":"m-1","content":"ok"},"durationMs":200}"#,
            ],
        );

        let meta = extract_session_metadata(&path, 1234)
            .await
            .unwrap()
            .expect("should index");

        assert_eq!(meta.session_id, "a1b2");
        assert_eq!(meta.message_count, 2);
        assert_eq!(meta.total_duration_ms, 300);
        assert_eq!(meta.model, "m-1");
        assert_eq!(meta.project_path.as_deref(), Some("/p"));
        assert_eq!(meta.summary.as_deref(), Some("hi"));
        assert_eq!(meta.first_timestamp.as_deref(), Some("2024-01-01T00:00:00Z"));
        assert_eq!(meta.last_timestamp.as_deref(), Some("2024-01-01T00:00:01Z"));
        assert_eq!(meta.last_scanned_at_ms, 1234);
    }

    #[tokio::test]
    async fn test_sidechain_entries_ignored() {
        let dir = TempDir::new().unwrap();
        let path = write_session(
            &dir,
            "s.jsonl",
            &[
                r#"{"type":"user","uuid":"u1","timestamp":"2024-01-01T00:00:00Z","cwd":"/p","message":{"content":"hi"},"durationMs":100}"#,
                r#"{"type":"assistant","uuid":"a1","timestamp":"2024-01-01T00:00:01Z","message":{"model":"m-1","content":"ok"},"durationMs":200}"#,
                r#"{"type":"assistant","isSidechain":true,"uuid":"x1","timestamp":"2024-01-01T00:00:02Z","message":{"model":"m-9","content":"internal"},"durationMs":999}"#,
            ],
        );

        let meta = extract_session_metadata(&path, 0).await.unwrap().unwrap();
        assert_eq!(meta.message_count, 2);
        assert_eq!(meta.total_duration_ms, 300);
        assert_eq!(meta.model, "m-1");
    }

    #[tokio::test]
    async fn test_sidechain_only_file_yields_nothing() {
        let dir = TempDir::new().unwrap();
        let path = write_session(
            &dir,
            "only.jsonl",
            &[
                r#"{"type":"user","isSidechain":true,"uuid":"u1","message":{"content":"a"}}"#,
                r#"{"type":"assistant","isSidechain":true,"uuid":"a1","message":{"content":"b"}}"#,
            ],
        );

        let meta = extract_session_metadata(&path, 0).await.unwrap();
        assert!(meta.is_none());
    }

    #[tokio::test]
    async fn test_summary_entry_overrides_fallback() {
        let dir = TempDir::new().unwrap();
        let path = write_session(
            &dir,
            "s.jsonl",
            &[
                r#"{"type":"user","uuid":"u1","timestamp":"2024-01-01T00:00:00Z","message":{"content":"hi"}}"#,
                r#"{"type":"summary","summary":"S"}"#,
            ],
        );

        let meta = extract_session_metadata(&path, 0).await.unwrap().unwrap();
        assert_eq!(meta.summary.as_deref(), Some("S"));
    }

    #[tokio::test]
    async fn test_malformed_and_truncated_lines_tolerated() {
        let dir = TempDir::new().unwrap();
        let path = write_session(
            &dir,
            "s.jsonl",
            &[
                r#"not json at all"#,
                r#"{"type":"user","uuid":"u1","timestamp":"2024-01-01T00:00:00Z","message":{"content":"hi"}}"#,
                r#"{"type":"assistant","uuid":"a1","timest"#,
            ],
        );

        let meta = extract_session_metadata(&path, 0).await.unwrap().unwrap();
        assert_eq!(meta.message_count, 1);
    }

    #[tokio::test]
    async fn test_empty_file_yields_nothing() {
        let dir = TempDir::new().unwrap();
        let path = write_session(&dir, "empty.jsonl", &[]);
        assert!(extract_session_metadata(&path, 0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let err = extract_session_metadata(Path::new("/nope/missing.jsonl"), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, ParseError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_model_defaults_to_unknown() {
        let dir = TempDir::new().unwrap();
        let path = write_session(
            &dir,
            "s.jsonl",
            &[r#"{"type":"user","uuid":"u1","message":{"content":"hi"}}"#],
        );
        let meta = extract_session_metadata(&path, 0).await.unwrap().unwrap();
        assert_eq!(meta.model, "Unknown");
    }

    #[tokio::test]
    async fn test_fallback_summary_from_text_blocks() {
        let dir = TempDir::new().unwrap();
        let path = write_session(
            &dir,
            "s.jsonl",
            &[
                r#"{"type":"user","uuid":"u1","message":{"content":[{"type":"text","text":"part one"},{"type":"text","text":"part two"}]}}"#,
            ],
        );
        let meta = extract_session_metadata(&path, 0).await.unwrap().unwrap();
        assert_eq!(meta.summary.as_deref(), Some("part one part two"));
    }

    #[test]
    fn test_fallback_summary_truncation() {
        let long = "x".repeat(150);
        let s = fallback_summary(&long);
        assert_eq!(s.chars().count(), FALLBACK_SUMMARY_MAX_CHARS + 3);
        assert!(s.ends_with("..."));

        let short = "line one\nline two";
        assert_eq!(fallback_summary(short), "line one line two");
    }
}
