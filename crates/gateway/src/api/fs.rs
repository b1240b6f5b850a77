//! Sandbox filesystem inspection and rollback.
//!
//! Everything here goes through the same path validation as the tools:
//! a request resolving outside the sandbox root is a client fault and
//! performs no I/O.

use std::path::Path as FsPath;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;

use wh_store::new_id;
use wh_tools::validate_path;

use crate::api::{api_error, session_not_found};
use crate::runtime::{read_file_best_effort, unified_diff};
use crate::state::AppState;

const TREE_MAX_ENTRIES: usize = 1000;

fn ensure_session(state: &AppState, session_id: &str) -> Option<Response> {
    match state.store.session_exists(session_id) {
        Ok(true) => None,
        Ok(false) => Some(session_not_found()),
        Err(e) => Some(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

#[derive(Debug, Deserialize)]
pub struct PathQuery {
    #[serde(default)]
    pub path: Option<String>,
}

/// `GET /sessions/:id/fs/tree?path=` — bounded recursive listing.
pub async fn tree(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<PathQuery>,
) -> Response {
    if let Some(resp) = ensure_session(&state, &session_id) {
        return resp;
    }
    let root = match &query.path {
        Some(raw) if !raw.is_empty() => match validate_path(&state.fs_root, raw) {
            Ok(p) => p,
            Err(e) => return api_error(StatusCode::BAD_REQUEST, e),
        },
        _ => state.fs_root.as_ref().clone(),
    };

    let mut entries = Vec::new();
    collect_tree(&root, &state.fs_root, &mut entries);
    Json(json!({"entries": entries, "truncated": entries.len() >= TREE_MAX_ENTRIES}))
        .into_response()
}

fn collect_tree(dir: &FsPath, fs_root: &FsPath, out: &mut Vec<serde_json::Value>) {
    if out.len() >= TREE_MAX_ENTRIES {
        return;
    }
    let Ok(read_dir) = std::fs::read_dir(dir) else {
        return;
    };
    let mut children: Vec<_> = read_dir.filter_map(|e| e.ok()).collect();
    children.sort_by_key(|e| e.file_name());
    for entry in children {
        if out.len() >= TREE_MAX_ENTRIES {
            return;
        }
        let path = entry.path();
        let Ok(meta) = entry.metadata() else { continue };
        let rel = wh_tools::display_path(fs_root, &path);
        out.push(json!({
            "path": rel,
            "is_dir": meta.is_dir(),
            "size": meta.len(),
        }));
        if meta.is_dir() {
            collect_tree(&path, fs_root, out);
        }
    }
}

/// `GET /sessions/:id/fs/read?path=`.
pub async fn read(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<PathQuery>,
) -> Response {
    if let Some(resp) = ensure_session(&state, &session_id) {
        return resp;
    }
    let raw = query.path.as_deref().unwrap_or("");
    let resolved = match validate_path(&state.fs_root, raw) {
        Ok(p) => p,
        Err(e) => return api_error(StatusCode::BAD_REQUEST, e),
    };
    match std::fs::read_to_string(&resolved) {
        Ok(content) => Json(json!({"path": raw, "content": content})).into_response(),
        Err(e) => api_error(StatusCode::NOT_FOUND, format!("cannot read '{raw}': {e}")),
    }
}

/// `GET /sessions/:id/fs/versions?path=` — version metadata (content is
/// fetched per-version).
pub async fn versions(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<PathQuery>,
) -> Response {
    if let Some(resp) = ensure_session(&state, &session_id) {
        return resp;
    }
    let Some(raw) = query.path.as_deref().filter(|p| !p.is_empty()) else {
        // Without a path: list all versioned paths in the session.
        return match state.store.versioned_paths(&session_id) {
            Ok(paths) => Json(json!({"paths": paths})).into_response(),
            Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };
    };
    match state.store.list_versions(&session_id, raw) {
        Ok(rows) => {
            let versions: Vec<_> = rows
                .iter()
                .map(|v| {
                    json!({
                        "id": v.id,
                        "path": v.path,
                        "idx": v.idx,
                        "sha256": v.sha256,
                        "note": v.note,
                        "size": v.content.len(),
                        "created_at": v.created_at,
                    })
                })
                .collect();
            Json(json!({"path": raw, "versions": versions})).into_response()
        }
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// `GET /sessions/:id/fs/version/:vid` — one snapshot with content.
pub async fn version(
    State(state): State<AppState>,
    Path((session_id, version_id)): Path<(String, String)>,
) -> Response {
    if let Some(resp) = ensure_session(&state, &session_id) {
        return resp;
    }
    match state.store.get_version(&version_id) {
        Ok(Some(row)) if row.session_id == session_id => Json(row).into_response(),
        Ok(_) => api_error(StatusCode::NOT_FOUND, "version not found"),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
pub struct RollbackRequest {
    pub path: String,
    pub version_id: String,
}

/// `POST /sessions/:id/fs/rollback` — restore a file to a recorded
/// version. Executes as a synthetic turn so the restore shows up in the
/// event stream like any other mutation. A rollback to content equal to
/// the current file is a no-op reporting `changed: false`.
pub async fn rollback(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<RollbackRequest>,
) -> Response {
    if let Some(resp) = ensure_session(&state, &session_id) {
        return resp;
    }

    let target = match state.store.get_version(&body.version_id) {
        Ok(Some(v)) if v.session_id == session_id && v.path == body.path => v,
        Ok(_) => return api_error(StatusCode::NOT_FOUND, "version not found"),
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    let resolved = match validate_path(&state.fs_root, &body.path) {
        Ok(p) => p,
        Err(e) => return api_error(StatusCode::BAD_REQUEST, e),
    };

    let run = (|| -> wh_domain::Result<serde_json::Value> {
        let turn = state.store.create_turn(
            &session_id,
            &format!("Rollback {} to version {}", body.path, target.idx),
        )?;
        let step = state.store.create_step(&turn.id, 0)?;
        let tool_call_id = new_id("tc");

        state.bus.publish(
            &session_id,
            &turn.id,
            &step.id,
            "tool_call",
            &json!({
                "tool_call_id": tool_call_id,
                "tool_name": "fs.rollback",
                "input": {"path": body.path, "version_id": body.version_id},
                "status": "running",
            }),
        )?;

        let before = read_file_best_effort(&resolved);
        let changed = before != target.content;

        if changed {
            if let Some(parent) = resolved.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&resolved, &target.content)?;

            let diff = unified_diff(&body.path, &before, &target.content);
            state
                .store
                .add_file_change(&session_id, &turn.id, &step.id, &body.path, &diff)?;
            state.store.ensure_base_version(
                &session_id,
                &body.path,
                &before,
                Some(&turn.id),
                Some(&step.id),
            )?;
            state.store.add_version(
                &session_id,
                &body.path,
                &target.content,
                "fs.rollback",
                Some(&turn.id),
                Some(&step.id),
            )?;

            state.bus.publish(
                &session_id,
                &turn.id,
                &step.id,
                "fs_rollback",
                &json!({
                    "tool_call_id": tool_call_id,
                    "path": body.path,
                    "version_id": body.version_id,
                    "idx": target.idx,
                }),
            )?;
            state.bus.publish(
                &session_id,
                &turn.id,
                &step.id,
                "diff",
                &json!({"tool_call_id": tool_call_id, "path": body.path, "diff": diff}),
            )?;
        }

        let summary = json!({"changed": changed, "path": body.path, "idx": target.idx});
        state.bus.publish(
            &session_id,
            &turn.id,
            &step.id,
            "tool_result",
            &json!({
                "tool_call_id": tool_call_id,
                "tool_name": "fs.rollback",
                "ok": true,
                "output": summary.to_string(),
                "error": "",
                "duration_ms": 0,
            }),
        )?;
        state.store.finish_step(&step.id, "completed")?;
        state.store.touch_session(&session_id)?;

        Ok(json!({
            "changed": changed,
            "path": body.path,
            "version_id": body.version_id,
            "idx": target.idx,
            "turn_id": turn.id,
        }))
    })();

    match run {
        Ok(result) => Json(result).into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
