//! Permission resolution endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use wh_domain::config::Policy;
use wh_domain::Error;

use crate::api::{api_error, session_not_found};
use crate::runtime::gate::Scope;
use crate::state::AppState;

/// Tools covered by the bulk permission mode. `spawn_subagent` is
/// orchestration-exempt and never listed.
const GATED_TOOLS: &[&str] = &["read_file", "write_file", "apply_patch", "search", "http_fetch"];

pub async fn pending(State(state): State<AppState>, Path(session_id): Path<String>) -> Response {
    match state.store.session_exists(&session_id) {
        Ok(true) => {}
        Ok(false) => return session_not_found(),
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
    match state.gate.pending_requests(&session_id) {
        Ok(rows) => Json(serde_json::json!({"pending": rows})).into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub status: String,
    #[serde(default = "default_scope")]
    pub scope: String,
}

fn default_scope() -> String {
    "once".into()
}

/// `POST /permissions/:rid/resolve` with `{status, scope}`.
pub async fn resolve(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
    Json(body): Json<ResolveRequest>,
) -> Response {
    let approved = match body.status.as_str() {
        "approved" => true,
        "denied" => false,
        other => {
            return api_error(
                StatusCode::BAD_REQUEST,
                format!("status must be 'approved' or 'denied', got '{other}'"),
            )
        }
    };
    let Some(scope) = Scope::parse(&body.scope) else {
        return api_error(
            StatusCode::BAD_REQUEST,
            format!("scope must be once|session|always, got '{}'", body.scope),
        );
    };

    match state.gate.resolve(&request_id, approved, scope) {
        Ok(()) => Json(serde_json::json!({"ok": true})).into_response(),
        Err(Error::NotFound(msg)) => api_error(StatusCode::NOT_FOUND, msg),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// `GET /permissions/mode` — the effective global policy across gated
/// tools: `ask`, `allow`, or `mixed`.
pub async fn get_mode(State(state): State<AppState>) -> Response {
    let durable = match state.store.get_tool_policies() {
        Ok(p) => p,
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    let policies: Vec<Policy> = GATED_TOOLS
        .iter()
        .map(|tool| {
            durable
                .get(*tool)
                .copied()
                .unwrap_or_else(|| state.config.tool_policy(tool))
        })
        .collect();

    let mode = if policies.iter().all(|p| *p == Policy::Allow) {
        "allow"
    } else if policies.iter().all(|p| *p == Policy::Ask) {
        "ask"
    } else {
        "mixed"
    };

    Json(serde_json::json!({"mode": mode, "tools": GATED_TOOLS})).into_response()
}

#[derive(Debug, Deserialize)]
pub struct ModeRequest {
    pub mode: String,
}

/// `POST /permissions/mode` — bulk-switch every gated tool to ask/allow.
pub async fn set_mode(State(state): State<AppState>, Json(body): Json<ModeRequest>) -> Response {
    let policy = match body.mode.as_str() {
        "ask" => Policy::Ask,
        "allow" => Policy::Allow,
        other => {
            return api_error(
                StatusCode::BAD_REQUEST,
                format!("mode must be 'ask' or 'allow', got '{other}'"),
            )
        }
    };
    for tool in GATED_TOOLS {
        if let Err(e) = state.store.upsert_tool_policy(tool, policy) {
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    }
    Json(serde_json::json!({"mode": body.mode})).into_response()
}
