//! Turn submission, inspection, and cancellation.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use wh_domain::Error;

use crate::api::{api_error, session_not_found};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TurnCreateRequest {
    pub content: String,
}

/// `POST /sessions/:id/turns` — admit a user message. Exactly one turn
/// runs per session; a concurrent submission gets 409.
pub async fn post_turn(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<TurnCreateRequest>,
) -> Response {
    if body.content.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "content must not be empty");
    }
    match state.store.session_exists(&session_id) {
        Ok(true) => {}
        Ok(false) => return session_not_found(),
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
    if state.provider.is_none() {
        return api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "no LLM provider configured; set [llm] base_url and api_key",
        );
    }

    match state.scheduler.start_turn(&state, &session_id, &body.content) {
        Ok(turn) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({
                "accepted": true,
                "session_id": session_id,
                "turn_id": turn.id,
            })),
        )
            .into_response(),
        Err(Error::Busy) => api_error(StatusCode::CONFLICT, "session is busy"),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub async fn list_turns(State(state): State<AppState>, Path(session_id): Path<String>) -> Response {
    match state.store.session_exists(&session_id) {
        Ok(true) => {}
        Ok(false) => return session_not_found(),
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
    match state.store.list_turns(&session_id) {
        Ok(turns) => Json(turns).into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub async fn get_turn(State(state): State<AppState>, Path(turn_id): Path<String>) -> Response {
    match state.store.get_turn(&turn_id) {
        Ok(Some(turn)) => Json(turn).into_response(),
        Ok(None) => api_error(StatusCode::NOT_FOUND, "turn not found"),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub async fn get_turn_steps(
    State(state): State<AppState>,
    Path(turn_id): Path<String>,
) -> Response {
    match state.store.get_turn(&turn_id) {
        Ok(Some(_)) => {}
        Ok(None) => return api_error(StatusCode::NOT_FOUND, "turn not found"),
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
    match state.store.list_steps(&turn_id) {
        Ok(steps) => Json(steps).into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// `POST /sessions/:id/cancel` — signal the running turn to stop.
pub async fn cancel_turn(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    match state.store.session_exists(&session_id) {
        Ok(true) => {}
        Ok(false) => return session_not_found(),
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
    let cancelled = state.scheduler.cancel(&session_id);
    if cancelled {
        Json(serde_json::json!({"cancelled": true})).into_response()
    } else {
        Json(serde_json::json!({"cancelled": false, "reason": "no active turn"})).into_response()
    }
}
