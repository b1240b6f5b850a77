//! Artifact listing and pinned-context management.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use crate::api::{api_error, session_not_found};
use crate::state::AppState;

fn ensure_session(state: &AppState, session_id: &str) -> Option<Response> {
    match state.store.session_exists(session_id) {
        Ok(true) => None,
        Ok(false) => Some(session_not_found()),
        Err(e) => Some(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

pub async fn file_changes(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    if let Some(resp) = ensure_session(&state, &session_id) {
        return resp;
    }
    match state.store.list_file_changes(&session_id) {
        Ok(rows) => Json(serde_json::json!({"file_changes": rows})).into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub async fn terminal(State(state): State<AppState>, Path(session_id): Path<String>) -> Response {
    if let Some(resp) = ensure_session(&state, &session_id) {
        return resp;
    }
    match state.store.list_terminal_chunks(&session_id) {
        Ok(rows) => Json(serde_json::json!({"chunks": rows})).into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub async fn context_items(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    if let Some(resp) = ensure_session(&state, &session_id) {
        return resp;
    }
    match state.store.list_context_items(&session_id) {
        Ok(rows) => Json(serde_json::json!({"items": rows})).into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
pub struct PinRequest {
    pub kind: String,
    #[serde(default)]
    pub title: Option<String>,
    pub content_ref: String,
}

pub async fn pin_context(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<PinRequest>,
) -> Response {
    if let Some(resp) = ensure_session(&state, &session_id) {
        return resp;
    }
    if !matches!(body.kind.as_str(), "doc" | "file" | "web") {
        return api_error(StatusCode::BAD_REQUEST, "kind must be doc|file|web");
    }
    if body.content_ref.is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "content_ref must not be empty");
    }
    let title = body.title.as_deref().unwrap_or(&body.content_ref);
    match state
        .store
        .upsert_context_item(&session_id, &body.kind, title, &body.content_ref, true)
    {
        Ok(row) => Json(row).into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
pub struct UnpinRequest {
    pub id: String,
}

pub async fn unpin_context(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<UnpinRequest>,
) -> Response {
    if let Some(resp) = ensure_session(&state, &session_id) {
        return resp;
    }
    match state.store.set_context_pinned(&body.id, false) {
        Ok(true) => Json(serde_json::json!({"ok": true})).into_response(),
        Ok(false) => api_error(StatusCode::NOT_FOUND, "context item not found"),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
pub struct SetRefRequest {
    pub id: String,
    pub content_ref: String,
}

pub async fn set_pinned_ref(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<SetRefRequest>,
) -> Response {
    if let Some(resp) = ensure_session(&state, &session_id) {
        return resp;
    }
    if body.content_ref.is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "content_ref must not be empty");
    }
    match state.store.set_context_ref(&body.id, &body.content_ref) {
        Ok(true) => Json(serde_json::json!({"ok": true})).into_response(),
        Ok(false) => api_error(StatusCode::NOT_FOUND, "context item not found"),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
