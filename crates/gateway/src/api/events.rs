//! Event replay and the SSE stream.
//!
//! Replay is a plain JSON page ordered by global id. The SSE endpoint
//! replays from `Last-Event-Id` (or `?since=`), then tails the bus:
//! sleep on the broadcast notifier, re-query the store, emit. Heartbeats
//! are synthetic frames and never persisted.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Json, Response};
use futures_util::stream::Stream;
use serde::Deserialize;

use wh_store::EventRow;

use crate::api::{api_error, session_not_found};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ReplayQuery {
    #[serde(default)]
    pub since: Option<i64>,
    #[serde(default)]
    pub since_seq: Option<i64>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// `GET /sessions/:id/events` — ordered replay page.
pub async fn session_events(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<ReplayQuery>,
) -> Response {
    match state.store.session_exists(&session_id) {
        Ok(true) => {}
        Ok(false) => return session_not_found(),
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
    let limit = query
        .limit
        .unwrap_or(state.config.sse.replay_limit)
        .min(state.config.sse.replay_limit);
    match state
        .bus
        .session_events_since(&session_id, query.since, query.since_seq, limit)
    {
        Ok(events) => Json(serde_json::json!({"events": events})).into_response(),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
pub struct SseQuery {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub since: Option<i64>,
}

fn event_frame(event: &EventRow) -> Event {
    Event::default()
        .id(event.id.to_string())
        .event("event")
        .data(serde_json::to_string(event).unwrap_or_else(|_| "{}".into()))
}

/// `GET /event?session_id=&since=` — live event stream with resume.
pub async fn sse(
    State(state): State<AppState>,
    Query(query): Query<SseQuery>,
    headers: HeaderMap,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // `Last-Event-Id` (set by the browser on reconnect) wins over the
    // explicit query parameter.
    let header_last_id = headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok());
    let mut last_id = header_last_id.or(query.since).unwrap_or(0);

    let session_id = query.session_id.clone();
    let replay_limit = state.config.sse.replay_limit;
    let wait_timeout = Duration::from_secs(state.config.sse.wait_timeout_secs);

    let stream = async_stream::stream! {
        let latest = state.bus.latest_event_id().unwrap_or(0);
        yield Ok(Event::default()
            .id("0")
            .event("connected")
            .data(
                serde_json::json!({
                    "server_time": wh_store::now_ts(),
                    "latest_id": latest,
                })
                .to_string(),
            ));

        loop {
            let pending = state
                .bus
                .events_since(session_id.as_deref(), Some(last_id), replay_limit)
                .unwrap_or_default();
            for event in &pending {
                last_id = event.id;
                yield Ok(event_frame(event));
            }

            if !state.bus.wait_for_new(wait_timeout).await {
                yield Ok(Event::default().id("0").event("heartbeat").data("{}"));
            }
        }
    };

    Sse::new(stream)
}
