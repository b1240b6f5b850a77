//! HTTP + SSE surface.
//!
//! All endpoints live under `/api/v1` and speak JSON. Every response
//! carries `Content-Security-Policy` and `X-Content-Type-Options` headers;
//! CORS is permissive by default (tightening is deployer policy).

pub mod artifacts;
pub mod events;
pub mod export;
pub mod fs;
pub mod permissions;
pub mod sessions;
pub mod turns;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build a standardized JSON error response: `{ "error": "<message>" }`.
pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message.into() })),
    )
        .into_response()
}

/// 404 helper for unknown sessions.
pub(crate) fn session_not_found() -> Response {
    api_error(StatusCode::NOT_FOUND, "session not found")
}

pub(crate) async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "ok": true,
        "time": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Build the full API router with CORS, tracing, and security headers.
pub fn router(state: AppState) -> Router {
    let csp = HeaderValue::from_str(&state.config.security.csp)
        .unwrap_or_else(|_| HeaderValue::from_static("default-src 'self'"));

    Router::new()
        .route("/api/v1/health", get(health))
        // Sessions
        .route(
            "/api/v1/sessions",
            get(sessions::list_sessions).post(sessions::create_session),
        )
        .route(
            "/api/v1/sessions/:id",
            get(sessions::get_session)
                .patch(sessions::patch_session)
                .delete(sessions::delete_session),
        )
        .route(
            "/api/v1/sessions/:id/model",
            get(sessions::get_model)
                .post(sessions::set_model)
                .delete(sessions::clear_model),
        )
        // Turns / steps
        .route(
            "/api/v1/sessions/:id/turns",
            get(turns::list_turns).post(turns::post_turn),
        )
        .route("/api/v1/turns/:id", get(turns::get_turn))
        .route("/api/v1/turns/:id/steps", get(turns::get_turn_steps))
        .route("/api/v1/sessions/:id/cancel", post(turns::cancel_turn))
        // Artifacts
        .route(
            "/api/v1/sessions/:id/file_changes",
            get(artifacts::file_changes),
        )
        .route("/api/v1/sessions/:id/terminal", get(artifacts::terminal))
        .route("/api/v1/sessions/:id/context", get(artifacts::context_items))
        .route(
            "/api/v1/sessions/:id/context/pin",
            post(artifacts::pin_context),
        )
        .route(
            "/api/v1/sessions/:id/context/unpin",
            post(artifacts::unpin_context),
        )
        .route(
            "/api/v1/sessions/:id/context/set_pinned_ref",
            post(artifacts::set_pinned_ref),
        )
        // Sandbox filesystem
        .route("/api/v1/sessions/:id/fs/tree", get(fs::tree))
        .route("/api/v1/sessions/:id/fs/read", get(fs::read))
        .route("/api/v1/sessions/:id/fs/versions", get(fs::versions))
        .route("/api/v1/sessions/:id/fs/version/:vid", get(fs::version))
        .route("/api/v1/sessions/:id/fs/rollback", post(fs::rollback))
        // Permissions
        .route(
            "/api/v1/sessions/:id/permissions/pending",
            get(permissions::pending),
        )
        .route(
            "/api/v1/permissions/:rid/resolve",
            post(permissions::resolve),
        )
        .route(
            "/api/v1/permissions/mode",
            get(permissions::get_mode).post(permissions::set_mode),
        )
        // Event replay + SSE
        .route("/api/v1/sessions/:id/events", get(events::session_events))
        .route("/api/v1/event", get(events::sse))
        // Export
        .route("/api/v1/sessions/:id/export.json", get(export::json))
        .route("/api/v1/sessions/:id/export.md", get(export::markdown))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("content-security-policy"),
            csp,
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
