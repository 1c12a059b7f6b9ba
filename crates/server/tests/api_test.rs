// crates/server/tests/api_test.rs
// End-to-end API behavior over an in-memory store and a temp archive.

use std::io::Write;
use std::path::PathBuf;

use axum_test::TestServer;
use cui_core::IndexedMetadata;
use cui_db::Database;
use cui_server::{create_app, AppState, StreamBroadcaster};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::TempDir;

struct TestHarness {
    server: TestServer,
    db: Database,
    projects: TempDir,
}

async fn harness() -> TestHarness {
    let db = Database::new_in_memory().await.expect("in-memory store");
    let projects = TempDir::new().unwrap();
    let state = AppState::new(
        db.clone(),
        StreamBroadcaster::new(),
        projects.path().to_path_buf(),
    );
    let server = TestServer::new(create_app(state));
    TestHarness {
        server,
        db,
        projects,
    }
}

fn write_session_file(projects: &TempDir, project: &str, name: &str, lines: &[&str]) -> PathBuf {
    let dir = projects.path().join(project);
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    for line in lines {
        writeln!(f, "{}", line).unwrap();
    }
    path
}

fn indexed(session_id: &str, file_path: &str) -> IndexedMetadata {
    IndexedMetadata {
        session_id: session_id.to_string(),
        summary: Some("hi".to_string()),
        project_path: Some("/p".to_string()),
        file_path: file_path.to_string(),
        message_count: 2,
        total_duration_ms: 300,
        model: "m-1".to_string(),
        first_timestamp: Some("2024-01-01T00:00:00Z".to_string()),
        last_timestamp: Some("2024-01-01T00:00:01Z".to_string()),
        last_scanned_at_ms: 1_000,
    }
}

#[tokio::test]
async fn list_starts_empty() {
    let h = harness().await;
    let res = h.server.get("/api/conversations").await;
    assert_eq!(res.status_code(), 200);
    let body: Value = res.json();
    assert_eq!(body["total"], 0);
    assert!(body["conversations"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn update_then_list_round_trip() {
    let h = harness().await;

    let res = h
        .server
        .put("/api/conversations/abc")
        .json(&json!({ "customName": "demo", "pinned": true }))
        .await;
    assert_eq!(res.status_code(), 200);
    let record: Value = res.json();
    assert_eq!(record["sessionId"], "abc");
    assert_eq!(record["customName"], "demo");
    assert_eq!(record["pinned"], true);

    let res = h.server.get("/api/conversations").await;
    let body: Value = res.json();
    assert_eq!(body["total"], 1);
    assert_eq!(body["conversations"][0]["customName"], "demo");
}

#[tokio::test]
async fn list_filters_pass_through() {
    let h = harness().await;
    h.db.upsert_indexed_batch(&[indexed("a", "/x/a.jsonl"), indexed("b", "/x/b.jsonl")])
        .await
        .unwrap();
    h.db.update_session(
        "a",
        &cui_db::SessionUpdate {
            archived: Some(true),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let res = h
        .server
        .get("/api/conversations")
        .add_query_param("archived", "true")
        .await;
    let body: Value = res.json();
    assert_eq!(body["total"], 1);
    assert_eq!(body["conversations"][0]["sessionId"], "a");
}

#[tokio::test]
async fn detail_unknown_session_is_conversation_not_found() {
    let h = harness().await;
    let res = h.server.get("/api/conversations/ghost").await;
    assert_eq!(res.status_code(), 404);
    let body: Value = res.json();
    assert_eq!(body["code"], "CONVERSATION_NOT_FOUND");
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn detail_resolves_file_via_directory_fallback() {
    let h = harness().await;
    // File on disk but never indexed: the fallback scan finds it.
    write_session_file(
        &h.projects,
        "-p-demo",
        "sess1.jsonl",
        &[
            r#"{"type":"user","uuid":"u1","timestamp":"2024-01-01T00:00:00Z","message":{"content":"hi"}}"#,
            r#"{"type":"assistant","uuid":"a1","parentUuid":"u1","timestamp":"2024-01-01T00:00:05Z","message":{"content":"late"}}"#,
            r#"{"type":"assistant","uuid":"a2","parentUuid":"u1","timestamp":"2024-01-01T00:00:02Z","message":{"content":"early"}}"#,
            r#"{"type":"user","uuid":"u2","parentUuid":"a1","timestamp":"2024-01-01T00:00:09Z","message":{"content":"more"}}"#,
        ],
    );

    let res = h.server.get("/api/conversations/sess1").await;
    assert_eq!(res.status_code(), 200);
    let body: Value = res.json();
    let order: Vec<&str> = body["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["uuid"].as_str().unwrap())
        .collect();
    // Branches visit in ascending timestamp order, pre-order output.
    assert_eq!(order, vec!["u1", "a2", "a1", "u2"]);
}

#[tokio::test]
async fn detail_with_vanished_file_is_file_not_found() {
    let h = harness().await;
    let gone = h.projects.path().join("-p-x").join("lost.jsonl");
    h.db.upsert_indexed_batch(&[indexed("lost", gone.to_str().unwrap())])
        .await
        .unwrap();

    let res = h.server.get("/api/conversations/lost").await;
    assert_eq!(res.status_code(), 404);
    let body: Value = res.json();
    assert_eq!(body["code"], "FILE_NOT_FOUND");
    assert!(body["message"].as_str().unwrap().contains("lost.jsonl"));
}

#[tokio::test]
async fn detail_filters_tool_result_entries() {
    let h = harness().await;
    write_session_file(
        &h.projects,
        "-p-demo",
        "tools.jsonl",
        &[
            r#"{"type":"user","uuid":"u1","timestamp":"2024-01-01T00:00:00Z","message":{"content":"run it"}}"#,
            r#"{"type":"assistant","uuid":"a1","parentUuid":"u1","timestamp":"2024-01-01T00:00:01Z","message":{"content":[{"type":"tool_use","name":"Bash","input":{}}]}}"#,
            r#"{"type":"user","uuid":"t1","parentUuid":"a1","timestamp":"2024-01-01T00:00:02Z","message":{"content":[{"type":"tool_result","content":"output"}]}}"#,
        ],
    );

    let res = h.server.get("/api/conversations/tools").await;
    let body: Value = res.json();
    let uuids: Vec<&str> = body["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["uuid"].as_str().unwrap())
        .collect();
    assert_eq!(uuids, vec!["u1", "a1"]);
}

#[tokio::test]
async fn metadata_is_null_for_unknown_session() {
    let h = harness().await;
    let res = h.server.get("/api/conversations/ghost/metadata").await;
    assert_eq!(res.status_code(), 200);
    let body: Value = res.json();
    assert!(body.is_null());
}

#[tokio::test]
async fn metadata_reads_store_only() {
    let h = harness().await;
    // No file on disk at this path — metadata must come from the store.
    h.db.upsert_indexed_batch(&[indexed("m1", "/gone/m1.jsonl")])
        .await
        .unwrap();

    let res = h.server.get("/api/conversations/m1/metadata").await;
    assert_eq!(res.status_code(), 200);
    let body: Value = res.json();
    assert_eq!(body["summary"], "hi");
    assert_eq!(body["projectPath"], "/p");
    assert_eq!(body["model"], "m-1");
    assert_eq!(body["totalDurationMs"], 300);
}

#[tokio::test]
async fn delete_session_then_404() {
    let h = harness().await;
    h.db.upsert_indexed_batch(&[indexed("d1", "/x/d1.jsonl")])
        .await
        .unwrap();

    let res = h.server.delete("/api/conversations/d1").await;
    assert_eq!(res.status_code(), 200);
    let body: Value = res.json();
    assert_eq!(body["success"], true);

    let res = h.server.delete("/api/conversations/d1").await;
    assert_eq!(res.status_code(), 404);
}

#[tokio::test]
async fn archive_all_reports_count() {
    let h = harness().await;
    h.db.upsert_indexed_batch(&[indexed("a", "/x/a.jsonl"), indexed("b", "/x/b.jsonl")])
        .await
        .unwrap();

    let res = h.server.post("/api/conversations/archive-all").await;
    assert_eq!(res.status_code(), 200);
    let body: Value = res.json();
    assert_eq!(body["archived"], 2);
}

#[tokio::test]
async fn health_reports_store_stats() {
    let h = harness().await;
    h.db.upsert_indexed_batch(&[indexed("a", "/x/a.jsonl")])
        .await
        .unwrap();

    let res = h.server.get("/api/health").await;
    assert_eq!(res.status_code(), 200);
    let body: Value = res.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["store"]["count"], 1);
}
