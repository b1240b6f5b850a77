//! Session management endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use crate::api::{api_error, session_not_found};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SessionCreateRequest {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SessionPatchRequest {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct ModelRequest {
    pub model: String,
}

fn session_json(state: &AppState, row: &wh_store::SessionRow) -> serde_json::Value {
    let status = if state.scheduler.is_running(&row.id) {
        "running"
    } else {
        "idle"
    };
    let mut value = serde_json::to_value(row).unwrap_or_default();
    value["status"] = serde_json::json!(status);
    value
}

pub async fn create_session(
    State(state): State<AppState>,
    Json(body): Json<SessionCreateRequest>,
) -> Response {
    let title = body.title.as_deref().filter(|t| !t.trim().is_empty());
    match state.store.create_session(title) {
        Ok(row) => Json(session_json(&state, &row)).into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub async fn list_sessions(State(state): State<AppState>) -> Response {
    match state.store.list_sessions() {
        Ok(rows) => {
            let items: Vec<_> = rows.iter().map(|r| session_json(&state, r)).collect();
            Json(items).into_response()
        }
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let row = match state.store.get_session(&session_id) {
        Ok(Some(row)) => row,
        Ok(None) => return session_not_found(),
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    let messages = match state.store.get_messages(&session_id) {
        Ok(m) => m,
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    let mut value = session_json(&state, &row);
    value["messages"] = serde_json::to_value(messages).unwrap_or_default();
    Json(value).into_response()
}

pub async fn patch_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<SessionPatchRequest>,
) -> Response {
    let title = body.title.trim();
    if title.is_empty() || title.len() > 200 {
        return api_error(StatusCode::BAD_REQUEST, "title must be 1-200 characters");
    }
    match state.store.update_session_title(&session_id, title) {
        Ok(true) => match state.store.get_session(&session_id) {
            Ok(Some(row)) => Json(session_json(&state, &row)).into_response(),
            _ => session_not_found(),
        },
        Ok(false) => session_not_found(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    match state.store.session_exists(&session_id) {
        Ok(true) => {}
        Ok(false) => return session_not_found(),
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }

    // Stop the running turn (if any) before the cascade delete; the
    // runner must not keep appending events into vanishing rows.
    state.scheduler.abort(&session_id);
    state.gate.forget_session(&session_id);

    match state.store.delete_session(&session_id) {
        Ok(true) => Json(serde_json::json!({"deleted": true})).into_response(),
        Ok(false) => session_not_found(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

// ── Per-session model override ─────────────────────────────────────

pub async fn get_model(State(state): State<AppState>, Path(session_id): Path<String>) -> Response {
    match state.store.get_session(&session_id) {
        Ok(Some(row)) => {
            Json(serde_json::json!({"model": row.model_override})).into_response()
        }
        Ok(None) => session_not_found(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub async fn set_model(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<ModelRequest>,
) -> Response {
    let model = body.model.trim();
    if model.is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "model must not be empty");
    }
    match state.store.set_model_override(&session_id, Some(model)) {
        Ok(true) => Json(serde_json::json!({"model": model})).into_response(),
        Ok(false) => session_not_found(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub async fn clear_model(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    match state.store.set_model_override(&session_id, None) {
        Ok(true) => Json(serde_json::json!({"model": serde_json::Value::Null})).into_response(),
        Ok(false) => session_not_found(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
