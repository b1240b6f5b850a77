//! HTTP surface tests driven through the router: status codes, security
//! headers, busy conflicts, permission resolution, and rollback.

mod common;

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use common::*;

const ALLOW_ALL: &str = r#"
[permissions]
default_policy = "allow"
"#;

async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn security_headers_on_every_response() {
    let provider = ScriptedProvider::new();
    let (state, _dir) = test_state(ALLOW_ALL, provider);
    let app = wh_gateway::api::router(state);

    let resp = app.oneshot(get("/api/v1/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("content-security-policy").unwrap(),
        "default-src 'self'"
    );
    assert_eq!(
        resp.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
}

#[tokio::test]
async fn session_crud_round_trip() {
    let provider = ScriptedProvider::new();
    let (state, _dir) = test_state(ALLOW_ALL, provider);
    let app = wh_gateway::api::router(state);

    // Create.
    let resp = app
        .clone()
        .oneshot(post_json("/api/v1/sessions", serde_json::json!({"title": "demo"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let created = body_json(resp).await;
    let session_id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["title"], "demo");
    assert_eq!(created["status"], "idle");

    // Rename.
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri(format!("/api/v1/sessions/{session_id}"))
                .header("content-type", "application/json")
                .body(Body::from(r#"{"title": "renamed"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["title"], "renamed");

    // Model override.
    let resp = app
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/sessions/{session_id}/model"),
            serde_json::json!({"model": "gpt-4o-mini"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = app
        .clone()
        .oneshot(get(&format!("/api/v1/sessions/{session_id}/model")))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["model"], "gpt-4o-mini");

    // Delete cascades.
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/v1/sessions/{session_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = app
        .oneshot(get(&format!("/api/v1/sessions/{session_id}")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_session_is_404_and_unknown_permission_is_404() {
    let provider = ScriptedProvider::new();
    let (state, _dir) = test_state(ALLOW_ALL, provider);
    let app = wh_gateway::api::router(state);

    let resp = app
        .clone()
        .oneshot(get("/api/v1/sessions/ses_missing"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app
        .oneshot(post_json(
            "/api/v1/permissions/perm_missing/resolve",
            serde_json::json!({"status": "approved", "scope": "once"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn concurrent_turn_submission_conflicts_with_409() {
    let provider = ScriptedProvider::new();
    provider.push_stream(ScriptedStream {
        pre_delay: Duration::from_millis(300),
        events: text_stream(&["slow"]).events,
    });
    let (state, _dir) = test_state(ALLOW_ALL, provider.clone());
    let app = wh_gateway::api::router(state.clone());

    let session = state.store.create_session(None).unwrap();
    seed_history(&state, &session.id);

    let uri = format!("/api/v1/sessions/{}/turns", session.id);
    let first = app
        .clone()
        .oneshot(post_json(&uri, serde_json::json!({"content": "one"})))
        .await
        .unwrap();
    let second = app
        .clone()
        .oneshot(post_json(&uri, serde_json::json!({"content": "two"})))
        .await
        .unwrap();

    assert_eq!(first.status(), StatusCode::ACCEPTED);
    assert_eq!(second.status(), StatusCode::CONFLICT);

    let accepted = body_json(first).await;
    assert_eq!(accepted["accepted"], true);
    let turn_id = accepted["turn_id"].as_str().unwrap().to_string();

    state.scheduler.wait_idle(&session.id).await;

    // Event replay endpoint returns the accepted turn's events only.
    let resp = app
        .oneshot(get(&format!("/api/v1/sessions/{}/events", session.id)))
        .await
        .unwrap();
    let page = body_json(resp).await;
    let events = page["events"].as_array().unwrap();
    assert!(!events.is_empty());
    assert!(events.iter().all(|e| e["turn_id"] == turn_id.as_str()));
    // Dense seq from 1.
    for (i, e) in events.iter().enumerate() {
        assert_eq!(e["seq"], (i + 1) as i64);
    }
}

#[tokio::test]
async fn event_replay_since_returns_exact_suffix() {
    let provider = ScriptedProvider::new();
    provider.push_stream(text_stream(&["a", "b", "c"]));
    let (state, _dir) = test_state(ALLOW_ALL, provider);
    let app = wh_gateway::api::router(state.clone());

    let session = state.store.create_session(None).unwrap();
    seed_history(&state, &session.id);
    state
        .scheduler
        .start_turn(&state, &session.id, "stream")
        .unwrap();
    state.scheduler.wait_idle(&session.id).await;

    let resp = app
        .clone()
        .oneshot(get(&format!("/api/v1/sessions/{}/events", session.id)))
        .await
        .unwrap();
    let page = body_json(resp).await;
    let all = page["events"].as_array().unwrap();
    assert!(all.len() >= 4);

    let pivot = all[2]["id"].as_i64().unwrap();
    let resp = app
        .oneshot(get(&format!(
            "/api/v1/sessions/{}/events?since={pivot}",
            session.id
        )))
        .await
        .unwrap();
    let suffix_page = body_json(resp).await;
    let suffix = suffix_page["events"].as_array().unwrap();
    let expected: Vec<i64> = all[3..].iter().map(|e| e["id"].as_i64().unwrap()).collect();
    let got: Vec<i64> = suffix.iter().map(|e| e["id"].as_i64().unwrap()).collect();
    assert_eq!(got, expected);
}

// ── S4: rollback ───────────────────────────────────────────────────

#[tokio::test]
async fn rollback_restores_version_and_is_idempotent() {
    let provider = ScriptedProvider::new();
    let (state, _dir) = test_state(ALLOW_ALL, provider);
    let app = wh_gateway::api::router(state.clone());

    let session = state.store.create_session(None).unwrap();

    // Seed: the file currently holds "x"; version 0 recorded the
    // pre-mutation empty state.
    std::fs::write(state.fs_root.join("notes.txt"), "x").unwrap();
    state
        .store
        .ensure_base_version(&session.id, "notes.txt", "", None, None)
        .unwrap();
    state
        .store
        .add_version(&session.id, "notes.txt", "x", "write_file", None, None)
        .unwrap();
    let base = &state.store.list_versions(&session.id, "notes.txt").unwrap()[0];
    let base_id = base.id.clone();

    let uri = format!("/api/v1/sessions/{}/fs/rollback", session.id);
    let resp = app
        .clone()
        .oneshot(post_json(
            &uri,
            serde_json::json!({"path": "notes.txt", "version_id": base_id}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let result = body_json(resp).await;
    assert_eq!(result["changed"], true);
    assert_eq!(result["idx"], 0);

    // The file is back to the base content.
    assert_eq!(
        std::fs::read_to_string(state.fs_root.join("notes.txt")).unwrap(),
        ""
    );

    // The synthetic turn surfaced the restore through events.
    let rollback_turn = result["turn_id"].as_str().unwrap();
    let events = state
        .bus
        .session_events_since(&session.id, None, None, 100)
        .unwrap();
    let turn_events: Vec<_> = events
        .iter()
        .filter(|e| e.turn_id == rollback_turn)
        .collect();
    let kinds: Vec<&str> = turn_events.iter().map(|e| e.kind.as_str()).collect();
    assert_eq!(kinds, vec!["tool_call", "fs_rollback", "diff", "tool_result"]);
    assert_eq!(turn_events[0].payload["tool_name"], "fs.rollback");
    assert!(turn_events[2].payload["diff"].as_str().unwrap().contains("-x"));
    assert_eq!(turn_events[3].payload["ok"], true);

    // A new version was appended for the restored content.
    let versions = state.store.list_versions(&session.id, "notes.txt").unwrap();
    assert_eq!(versions.len(), 3);
    assert_eq!(versions[2].note, "fs.rollback");

    // Rolling back again to the same content is a no-op.
    let resp = app
        .oneshot(post_json(
            &uri,
            serde_json::json!({"path": "notes.txt", "version_id": base_id}),
        ))
        .await
        .unwrap();
    let result = body_json(resp).await;
    assert_eq!(result["changed"], false);
    assert_eq!(
        state.store.list_versions(&session.id, "notes.txt").unwrap().len(),
        3,
        "idempotent rollback must not add versions"
    );
}

#[tokio::test]
async fn fs_read_rejects_traversal_without_io() {
    let provider = ScriptedProvider::new();
    let (state, _dir) = test_state(ALLOW_ALL, provider);
    let app = wh_gateway::api::router(state.clone());

    let session = state.store.create_session(None).unwrap();
    let resp = app
        .oneshot(get(&format!(
            "/api/v1/sessions/{}/fs/read?path=../secret.txt",
            session.id
        )))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn export_markdown_renders_transcript() {
    let provider = ScriptedProvider::new();
    let (state, _dir) = test_state(ALLOW_ALL, provider);
    let app = wh_gateway::api::router(state.clone());

    let session = state.store.create_session(Some("weekly notes")).unwrap();
    state.store.add_message(&session.id, "user", "hello").unwrap();
    state
        .store
        .add_message(&session.id, "assistant", "hi there")
        .unwrap();

    let resp = app
        .oneshot(get(&format!("/api/v1/sessions/{}/export.md", session.id)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/markdown"));
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8_lossy(&bytes);
    assert!(text.contains("# weekly notes"));
    assert!(text.contains("## User"));
    assert!(text.contains("hi there"));
}
