//! Session export: a JSON bundle and a readable markdown transcript.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};

use crate::api::{api_error, session_not_found};
use crate::state::AppState;

pub async fn json(State(state): State<AppState>, Path(session_id): Path<String>) -> Response {
    let session = match state.store.get_session(&session_id) {
        Ok(Some(s)) => s,
        Ok(None) => return session_not_found(),
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    let bundle = (|| -> wh_domain::Result<serde_json::Value> {
        Ok(serde_json::json!({
            "session": session,
            "messages": state.store.get_messages(&session_id)?,
            "turns": state.store.list_turns(&session_id)?,
            "file_changes": state.store.list_file_changes(&session_id)?,
            "context_items": state.store.list_context_items(&session_id)?,
        }))
    })();

    match bundle {
        Ok(value) => Json(value).into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub async fn markdown(State(state): State<AppState>, Path(session_id): Path<String>) -> Response {
    let session = match state.store.get_session(&session_id) {
        Ok(Some(s)) => s,
        Ok(None) => return session_not_found(),
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    let messages = match state.store.get_messages(&session_id) {
        Ok(m) => m,
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    let mut out = String::new();
    out.push_str(&format!("# {}\n\n", session.title));
    out.push_str(&format!(
        "_Exported {} · session `{}`_\n\n",
        chrono::Utc::now().to_rfc3339(),
        session.id
    ));
    for message in &messages {
        let speaker = match message.role.as_str() {
            "user" => "User",
            "assistant" => "Assistant",
            other => other,
        };
        out.push_str(&format!("## {speaker}\n\n{}\n\n", message.content));
    }

    (
        [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
        out,
    )
        .into_response()
}
