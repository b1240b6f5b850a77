//! Best-effort auto-titling of new sessions.

use wh_domain::tool::Message;
use wh_providers::ChatRequest;

use crate::state::AppState;

const TITLE_MAX_CHARS: usize = 30;
const FALLBACK_MAX_CHARS: usize = 20;

/// Fire-and-forget: generate a short title from the session's first user
/// message. Falls back to a prefix of the user text when no provider is
/// configured or the call fails.
pub fn spawn_title_task(state: &AppState, session_id: &str, user_text: &str) {
    let state = state.clone();
    let session_id = session_id.to_string();
    let user_text = user_text.to_string();

    tokio::spawn(async move {
        let title = generate_title(&state, &user_text).await;
        if title.is_empty() {
            return;
        }
        if let Err(e) = state.store.update_session_title(&session_id, &title) {
            tracing::warn!(error = %e, session_id = %session_id, "failed to store session title");
        }
    });
}

async fn generate_title(state: &AppState, user_text: &str) -> String {
    let fallback = || prefix_chars(user_text.trim(), FALLBACK_MAX_CHARS);

    let Some(provider) = &state.provider else {
        return fallback();
    };

    let req = ChatRequest {
        messages: vec![
            Message::system(
                "Generate a short chat title (2-5 words) for the following user message. \
                 Reply with ONLY the title, no quotes, no explanation. \
                 Answer in the language of the message.",
            ),
            Message::user(prefix_chars(user_text, 200)),
        ],
        ..Default::default()
    };

    match provider.chat(&req).await {
        Ok(resp) => {
            let title = resp
                .content
                .trim()
                .trim_matches('"')
                .trim_matches('\'')
                .to_string();
            let title = prefix_chars(&title, TITLE_MAX_CHARS);
            if title.is_empty() {
                fallback()
            } else {
                title
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "title generation failed, using prefix");
            fallback()
        }
    }
}

fn prefix_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect::<String>().trim().to_string()
}
