//! System prompt assembly, including the pinned-context section.
//!
//! Pinned items are injected into every turn's system prompt. Items whose
//! raw content exceeds the summary trigger are summarized once through
//! the provider; the summary is cached on the item keyed by the content
//! hash, so unchanged files never pay for a second summarization.

use sha2::{Digest, Sha256};

use wh_domain::tool::Message;
use wh_providers::ChatRequest;
use wh_store::ContextItemRow;
use wh_tools::validate_path;

use crate::state::AppState;

const BASE_PROMPT: &str = "You are Wheelhouse, a coding agent operating inside a sandboxed \
workspace. You can read and modify files, apply patches, search the web, fetch URLs, and \
delegate focused tasks to subagents.\n\n\
Rules:\n\
- All file paths are relative to the workspace root.\n\
- Prefer apply_patch for multi-file or surgical edits; write_file for whole files.\n\
- Tool failures are reported back to you as text starting with 'Error'; adjust and retry.\n\
- When the task is done, reply with a clear final answer and stop calling tools.\n\n\
Available tools: read_file, write_file, apply_patch, search, http_fetch, spawn_subagent.\n\
Shell execution is not available.";

/// Build the full system prompt for a turn.
pub async fn build_system_prompt(state: &AppState, session_id: &str) -> String {
    let mut prompt = BASE_PROMPT.to_string();

    let pinned = match state.store.pinned_context_items(session_id) {
        Ok(items) => items,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load pinned context items");
            return prompt;
        }
    };
    if pinned.is_empty() {
        return prompt;
    }

    prompt.push_str("\n\n## Pinned Context\n");
    for item in &pinned {
        let rendered = render_item(state, item).await;
        prompt.push_str(&format!("\n### {} ({})\n{}\n", item.title, item.kind, rendered));
    }
    prompt
}

async fn render_item(state: &AppState, item: &ContextItemRow) -> String {
    let raw = load_raw(state, item);
    let trigger = state.config.runner.summary_trigger_chars;

    if raw.len() <= trigger {
        return raw;
    }

    let hash = hex::encode(Sha256::digest(raw.as_bytes()));
    if item.summary_sha256.as_deref() == Some(hash.as_str()) {
        if let Some(summary) = &item.summary {
            return summary.clone();
        }
    }

    match summarize(state, &raw).await {
        Some(summary) => {
            if let Err(e) = state.store.set_context_summary(&item.id, &summary, &hash) {
                tracing::warn!(error = %e, item_id = %item.id, "failed to cache summary");
            }
            summary
        }
        None => super::truncate_str(&raw, trigger),
    }
}

fn load_raw(state: &AppState, item: &ContextItemRow) -> String {
    match item.kind.as_str() {
        "file" => match validate_path(&state.fs_root, &item.content_ref) {
            Ok(path) => super::read_file_best_effort(&path),
            Err(_) => String::new(),
        },
        // Web items are not re-fetched at prompt time; the reference (and
        // any cached summary) is what gets injected.
        "web" => item
            .summary
            .clone()
            .unwrap_or_else(|| format!("(web resource: {})", item.content_ref)),
        // Doc items carry their content in the reference itself.
        _ => item.content_ref.clone(),
    }
}

async fn summarize(state: &AppState, raw: &str) -> Option<String> {
    let provider = state.provider.as_ref()?;
    let req = ChatRequest {
        messages: vec![
            Message::system(
                "Summarize the following content in at most 15 lines, preserving \
                 identifiers, paths, and key facts. Reply with only the summary.",
            ),
            Message::user(raw),
        ],
        ..Default::default()
    };
    match provider.chat(&req).await {
        Ok(resp) if !resp.content.trim().is_empty() => Some(resp.content.trim().to_string()),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(error = %e, "pinned context summarization failed");
            None
        }
    }
}
