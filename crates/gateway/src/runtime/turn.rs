//! Turn execution loop — the inner orchestrator that streams LLM
//! responses, dispatches tool calls behind the permission gate, records
//! artifacts, and publishes every observable effect to the event bus.
//!
//! Entry point: [`run_turn`], spawned by the scheduler as a background
//! task. One iteration of the loop is one Step (`idx >= 1`); step 0
//! carries the user message.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tracing::Instrument;
use serde_json::{json, Value};

use wh_domain::config::Policy;
use wh_domain::stream::{StreamEvent, Usage};
use wh_domain::tool::{Message, ToolCall};
use wh_domain::{Error, Result};
use wh_providers::{ChatRequest, LlmProvider};
use wh_store::new_id;
use wh_tools::{
    classify_result, display_path, extract_files_from_patch, validate_path, ApplyPatchTool,
    HttpFetchTool, ReadFileTool, SearchTool, SpawnSubagentTool, Tool, ToolContext, ToolRegistry,
    WriteFileTool,
};

use crate::runtime::cancel::CancelToken;
use crate::runtime::subagent::SubagentRunner;
use crate::runtime::{context, read_file_best_effort, truncate_str, unified_diff};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run one turn to completion. All outcomes are reported through events;
/// the final assistant text is additionally persisted to the session
/// history.
pub async fn run_turn(
    state: &AppState,
    session_id: &str,
    turn_id: &str,
    user_text: &str,
    cancel: &CancelToken,
) {
    let span = tracing::info_span!("turn", session_id = %session_id, turn_id = %turn_id);

    let mut run = TurnRun {
        state,
        session_id,
        turn_id,
        cancel,
        next_idx: 0,
    };

    let outcome = run.execute(user_text).instrument(span).await;
    match outcome {
        Ok(Outcome::Final(text)) => {
            if let Err(e) = state.store.add_message(session_id, "assistant", &text) {
                tracing::warn!(error = %e, "failed to persist assistant message");
            }
        }
        Ok(Outcome::Cancelled) | Ok(Outcome::Failed) => {}
        Err(e) => {
            tracing::error!(error = %e, "turn failed");
            run.emit_terminal_error("TURN_ERROR", &e.to_string());
        }
    }
}

enum Outcome {
    Final(String),
    Cancelled,
    Failed,
}

/// One completion's worth of accumulated stream state.
struct Completion {
    text: String,
    tool_calls: Vec<ToolCall>,
    finish_reason: String,
    usage: Option<Usage>,
    cancelled: bool,
}

#[derive(Default)]
struct ToolCallBuf {
    call_id: String,
    tool_name: String,
    args: String,
}

/// Pre-execution snapshot for mutation detection.
pub(crate) enum BeforeSnapshot {
    None,
    Write {
        display: String,
        abs: PathBuf,
        before: String,
    },
    Patch(HashMap<String, String>),
}

struct TurnRun<'a> {
    state: &'a AppState,
    session_id: &'a str,
    turn_id: &'a str,
    cancel: &'a CancelToken,
    next_idx: i64,
}

impl<'a> TurnRun<'a> {
    fn alloc_idx(&mut self) -> i64 {
        let idx = self.next_idx;
        self.next_idx += 1;
        idx
    }

    fn publish(&self, step_id: &str, kind: &str, payload: Value) -> Result<()> {
        self.state
            .bus
            .publish(self.session_id, self.turn_id, step_id, kind, &payload)?;
        Ok(())
    }

    /// Emit a terminal `error` event on a freshly created step. Best
    /// effort: a failing store at this point only leaves a log line.
    fn emit_terminal_error(&mut self, code: &str, message: &str) {
        let idx = self.alloc_idx();
        let step = match self.state.store.create_step(self.turn_id, idx) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "failed to create terminal step");
                return;
            }
        };
        if let Err(e) = self.publish(
            &step.id,
            "error",
            json!({"code": code, "message": message}),
        ) {
            tracing::warn!(error = %e, "failed to publish terminal error");
        }
        self.state.store.finish_step(&step.id, "error").ok();
    }

    fn emit_cancelled(&mut self) {
        self.emit_terminal_error("CANCELLED", "turn cancelled by user");
    }

    // ── Main loop ─────────────────────────────────────────────────

    async fn execute(&mut self, user_text: &str) -> Result<Outcome> {
        // Step 0: surface the user message.
        let idx0 = self.alloc_idx();
        let step0 = self.state.store.create_step(self.turn_id, idx0)?;
        let user_message_id = new_id("msg");
        self.publish(
            &step0.id,
            "message_delta",
            json!({"role": "user", "message_id": user_message_id, "delta": user_text}),
        )?;
        self.state.store.finish_step(&step0.id, "completed")?;

        let provider = self
            .state
            .provider
            .clone()
            .ok_or_else(|| Error::Other("no LLM provider configured".into()))?;

        let mut messages = self.build_messages(user_text).await?;
        let model = self
            .state
            .store
            .get_session(self.session_id)?
            .and_then(|s| s.model_override);

        let registry = build_registry(self.state);
        let tool_defs = registry.definitions();

        let mut total_usage = Usage::default();
        let max_iterations = self.state.config.runner.max_iterations;

        for _ in 0..max_iterations {
            if self.cancel.is_cancelled() {
                self.emit_cancelled();
                return Ok(Outcome::Cancelled);
            }

            let idx = self.alloc_idx();
            let step = self.state.store.create_step(self.turn_id, idx)?;
            let assistant_message_id = new_id("msg");

            let req = ChatRequest {
                messages: messages.clone(),
                tools: tool_defs.clone(),
                temperature: Some(0.2),
                max_tokens: None,
                model: model.clone(),
            };

            let completion = match self
                .completion_with_fallback(&provider, &req, &step.id, &assistant_message_id)
                .await
            {
                Ok(c) => c,
                Err(e) => {
                    self.publish(
                        &step.id,
                        "error",
                        json!({"code": "TURN_ERROR", "message": e.to_string()}),
                    )?;
                    self.state.store.finish_step(&step.id, "error")?;
                    return Ok(Outcome::Failed);
                }
            };

            if completion.cancelled {
                self.state.store.finish_step(&step.id, "error")?;
                self.emit_cancelled();
                return Ok(Outcome::Cancelled);
            }

            if let Some(usage) = &completion.usage {
                total_usage.merge(usage);
            }

            // No tool calls: this is the final answer.
            if completion.tool_calls.is_empty() {
                self.publish(
                    &step.id,
                    "final",
                    json!({
                        "role": "assistant",
                        "message_id": assistant_message_id,
                        "text": completion.text,
                        "finish_reason": completion.finish_reason,
                        "usage": total_usage,
                    }),
                )?;
                self.state.store.finish_step(&step.id, "completed")?;
                return Ok(Outcome::Final(completion.text));
            }

            messages.push(Message::assistant_tool_calls(
                &completion.text,
                &completion.tool_calls,
            ));

            // Tool calls execute strictly in the order the model emitted
            // them; events for call k+1 never precede the result of k.
            for tc in &completion.tool_calls {
                if self.cancel.is_cancelled() {
                    self.state.store.finish_step(&step.id, "error")?;
                    self.emit_cancelled();
                    return Ok(Outcome::Cancelled);
                }
                self.run_tool(&registry, tc, &step.id, &mut messages).await?;
            }

            self.state.store.finish_step(&step.id, "completed")?;
        }

        self.emit_terminal_error(
            "MAX_ITERATIONS",
            &format!("tool loop limit reached ({max_iterations} iterations)"),
        );
        Ok(Outcome::Failed)
    }

    // ── Prompt assembly ───────────────────────────────────────────

    async fn build_messages(&self, user_text: &str) -> Result<Vec<Message>> {
        let system_prompt = context::build_system_prompt(self.state, self.session_id).await;
        let mut messages = vec![Message::system(system_prompt)];

        // The scheduler already persisted the current user message; drop
        // it from the history window and re-append it as the live turn.
        let mut history = self.state.store.get_messages(self.session_id)?;
        if history
            .last()
            .map(|m| m.role == "user" && m.content == user_text)
            .unwrap_or(false)
        {
            history.pop();
        }

        let window = self.state.config.runner.history_window;
        let start = history.len().saturating_sub(window);
        for row in &history[start..] {
            match row.role.as_str() {
                "user" => messages.push(Message::user(&row.content)),
                "assistant" => messages.push(Message::assistant(&row.content)),
                _ => {}
            }
        }

        messages.push(Message::user(user_text));
        Ok(messages)
    }

    // ── Streaming ─────────────────────────────────────────────────

    /// Stream one completion; on stream failure emit `LLM_STREAM_ERROR`
    /// and retry once with the blocking endpoint.
    async fn completion_with_fallback(
        &self,
        provider: &Arc<dyn LlmProvider>,
        req: &ChatRequest,
        step_id: &str,
        assistant_message_id: &str,
    ) -> Result<Completion> {
        match self.stream_completion(provider, req, step_id, assistant_message_id).await {
            Ok(completion) => Ok(completion),
            Err(e) => {
                tracing::warn!(error = %e, "stream failed, falling back to blocking completion");
                self.publish(
                    step_id,
                    "error",
                    json!({"code": "LLM_STREAM_ERROR", "message": e.to_string()}),
                )?;

                let resp = provider.chat(req).await?;
                if !resp.content.is_empty() {
                    self.publish(
                        step_id,
                        "message_delta",
                        json!({
                            "role": "assistant",
                            "message_id": assistant_message_id,
                            "delta": resp.content,
                        }),
                    )?;
                }
                Ok(Completion {
                    text: resp.content,
                    tool_calls: resp.tool_calls,
                    finish_reason: resp.finish_reason.unwrap_or_else(|| "stop".into()),
                    usage: resp.usage,
                    cancelled: false,
                })
            }
        }
    }

    async fn stream_completion(
        &self,
        provider: &Arc<dyn LlmProvider>,
        req: &ChatRequest,
        step_id: &str,
        assistant_message_id: &str,
    ) -> Result<Completion> {
        let mut stream = provider.chat_stream(req).await?;

        let mut text_buf = String::new();
        let mut tc_bufs: BTreeMap<u32, ToolCallBuf> = BTreeMap::new();
        let mut finish_reason = "stop".to_string();
        let mut usage: Option<Usage> = None;
        let mut thinking_started: Option<Instant> = None;
        let mut cancelled = false;

        while let Some(item) = stream.next().await {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            match item? {
                StreamEvent::Token { text } => {
                    self.publish(
                        step_id,
                        "message_delta",
                        json!({
                            "role": "assistant",
                            "message_id": assistant_message_id,
                            "delta": text,
                        }),
                    )?;
                    text_buf.push_str(&text);
                }
                StreamEvent::Thinking { text } => {
                    if thinking_started.is_none() {
                        thinking_started = Some(Instant::now());
                        self.publish(step_id, "thinking", json!({"status": "start"}))?;
                    }
                    self.publish(step_id, "thinking", json!({"status": "delta", "text": text}))?;
                }
                StreamEvent::ToolCallStarted {
                    index,
                    call_id,
                    tool_name,
                } => {
                    let buf = tc_bufs.entry(index).or_default();
                    if !call_id.is_empty() {
                        buf.call_id = call_id;
                    }
                    if !tool_name.is_empty() {
                        buf.tool_name = tool_name;
                    }
                }
                StreamEvent::ToolCallDelta { index, delta } => {
                    tc_bufs.entry(index).or_default().args.push_str(&delta);
                }
                StreamEvent::Done {
                    usage: done_usage,
                    finish_reason: done_reason,
                } => {
                    if let Some(u) = done_usage {
                        usage = Some(u);
                    }
                    if let Some(fr) = done_reason {
                        finish_reason = fr;
                    }
                }
            }
        }

        if let Some(started) = thinking_started {
            self.publish(
                step_id,
                "thinking",
                json!({"status": "end", "duration_ms": started.elapsed().as_millis() as u64}),
            )?;
        }

        Ok(Completion {
            text: text_buf,
            tool_calls: assemble_tool_calls(tc_bufs),
            finish_reason,
            usage,
            cancelled,
        })
    }

    // ── Tool dispatch ─────────────────────────────────────────────

    async fn run_tool(
        &self,
        registry: &ToolRegistry,
        tc: &ToolCall,
        step_id: &str,
        messages: &mut Vec<Message>,
    ) -> Result<()> {
        let tool_name = tc.tool_name.as_str();

        if !self.state.config.tool_enabled(tool_name) {
            let err = format!("Tool '{tool_name}' is disabled by configuration");
            return self.fail_tool(tc, step_id, &err, messages);
        }

        let mut policy = self.state.gate.effective_policy(self.session_id, tool_name);

        if policy == Policy::Ask {
            let ticket = self.state.gate.create_request(
                self.session_id,
                self.turn_id,
                step_id,
                tool_name,
                &tc.arguments,
            )?;
            self.publish(
                step_id,
                "tool_call",
                json!({
                    "tool_call_id": tc.call_id,
                    "tool_name": tool_name,
                    "input": tc.arguments,
                    "status": "permission_required",
                    "permission_request_id": ticket.request_id,
                    "choices": ["once", "session", "always", "deny"],
                }),
            )?;
            let timeout = Duration::from_secs(self.state.config.permissions.wait_timeout_secs);
            let decision = self.state.gate.wait(ticket, timeout).await;
            policy = if decision.approved {
                Policy::Allow
            } else {
                Policy::Deny
            };
        }

        if policy == Policy::Deny {
            let err = format!("Permission denied for tool '{tool_name}'");
            return self.fail_tool(tc, step_id, &err, messages);
        }

        self.publish(
            step_id,
            "tool_call",
            json!({
                "tool_call_id": tc.call_id,
                "tool_name": tool_name,
                "input": tc.arguments,
                "status": "running",
            }),
        )?;

        let snapshot = snapshot_before(self.state, tool_name, &tc.arguments);

        let started = Instant::now();
        let output = execute_tool(self.state, registry, tc, step_id, self.turn_id, self.session_id).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let (ok, error_text) = classify_result(tool_name, &output);
        let limit = self.state.config.runner.event_output_limit;
        self.publish(
            step_id,
            "tool_result",
            json!({
                "tool_call_id": tc.call_id,
                "tool_name": tool_name,
                "ok": ok,
                "output": if ok { truncate_str(&output, limit) } else { String::new() },
                "error": if ok { String::new() } else { truncate_str(&error_text, limit) },
                "duration_ms": duration_ms,
            }),
        )?;

        if ok {
            let diffs = record_artifacts(self.state, self.session_id, self.turn_id, step_id, &snapshot, tool_name, &output)?;
            for (path, diff) in diffs {
                self.publish(
                    step_id,
                    "diff",
                    json!({"tool_call_id": tc.call_id, "path": path, "diff": diff}),
                )?;
            }
            capture_context(self.state, self.session_id, tool_name, &tc.arguments, &output);
        }

        // The full text goes back to the model even when the event
        // payload was truncated.
        messages.push(Message::tool_result(&tc.call_id, &output));
        Ok(())
    }

    fn fail_tool(
        &self,
        tc: &ToolCall,
        step_id: &str,
        err: &str,
        messages: &mut Vec<Message>,
    ) -> Result<()> {
        self.publish(
            step_id,
            "tool_result",
            json!({
                "tool_call_id": tc.call_id,
                "tool_name": tc.tool_name,
                "ok": false,
                "output": "",
                "error": err,
                "duration_ms": 0,
            }),
        )?;
        messages.push(Message::tool_result(&tc.call_id, err));
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Shared helpers (also used by the subagent loop)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Build the full tool registry for a top-level turn.
pub(crate) fn build_registry(state: &AppState) -> ToolRegistry {
    let mut registry = subagent_registry(state);
    registry.register(Arc::new(SpawnSubagentTool::new(Arc::new(
        SubagentRunner::new(state.clone()),
    ))));
    registry
}

/// Registry without `spawn_subagent` — subagents cannot nest.
pub(crate) fn subagent_registry(state: &AppState) -> ToolRegistry {
    let root = state.fs_root.as_ref().clone();
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(ReadFileTool::new(root.clone())));
    registry.register(Arc::new(WriteFileTool::new(root.clone())));
    registry.register(Arc::new(ApplyPatchTool::new(root)));
    registry.register(Arc::new(SearchTool::new(Some(
        state.config.search.api_key.clone(),
    ))));
    registry.register(Arc::new(HttpFetchTool::new()));
    registry
}

/// Assemble buffered tool-call fragments (in stream index order) into
/// complete calls. Malformed argument JSON falls back to `{"raw": ...}`
/// so the model still sees what it sent.
fn assemble_tool_calls(bufs: BTreeMap<u32, ToolCallBuf>) -> Vec<ToolCall> {
    bufs.into_values()
        .map(|buf| {
            let trimmed = buf.args.trim();
            let arguments = if trimmed.is_empty() {
                json!({})
            } else {
                serde_json::from_str(trimmed).unwrap_or_else(|_| json!({"raw": buf.args}))
            };
            ToolCall {
                call_id: if buf.call_id.is_empty() {
                    new_id("tc")
                } else {
                    buf.call_id
                },
                tool_name: if buf.tool_name.is_empty() {
                    "unknown".into()
                } else {
                    buf.tool_name
                },
                arguments,
            }
        })
        .collect()
}

/// Look up, validate, and execute a tool call. All failures come back as
/// `Error: ...` strings.
pub(crate) async fn execute_tool(
    state: &AppState,
    registry: &ToolRegistry,
    tc: &ToolCall,
    step_id: &str,
    turn_id: &str,
    session_id: &str,
) -> String {
    let tool = match registry.get(&tc.tool_name) {
        Some(t) => t,
        None => return format!("Error: Tool '{}' not found", tc.tool_name),
    };

    let problems = wh_tools::validate_params(&tool.parameters(), &tc.arguments);
    if !problems.is_empty() {
        return format!(
            "Error: Invalid parameters for tool '{}': {}",
            tc.tool_name,
            problems.join("; ")
        );
    }

    let mut args = tc.arguments.clone();
    if tc.tool_name == "apply_patch" {
        // Patches apply from the sandbox root so relative paths line up.
        args["cwd"] = json!(state.fs_root.to_string_lossy());
    }

    let ctx = ToolContext {
        session_id: session_id.to_string(),
        turn_id: turn_id.to_string(),
        step_id: step_id.to_string(),
        parent_tool_call_id: tc.call_id.clone(),
    };
    tool.execute(&args, &ctx).await
}

/// Capture pre-mutation file contents for the tools that mutate.
pub(crate) fn snapshot_before(state: &AppState, tool_name: &str, args: &Value) -> BeforeSnapshot {
    match tool_name {
        "write_file" => {
            let raw = args.get("path").and_then(|v| v.as_str()).unwrap_or("");
            match validate_path(&state.fs_root, raw) {
                Ok(abs) => BeforeSnapshot::Write {
                    display: display_path(&state.fs_root, &abs),
                    before: read_file_best_effort(&abs),
                    abs,
                },
                Err(_) => BeforeSnapshot::None,
            }
        }
        "apply_patch" => {
            let patch = args.get("patch").and_then(|v| v.as_str()).unwrap_or("");
            let mut before = HashMap::new();
            for file in extract_files_from_patch(patch) {
                if file.path.is_empty() {
                    continue;
                }
                if let Ok(abs) = validate_path(&state.fs_root, &file.path) {
                    before.insert(file.path.clone(), read_file_best_effort(&abs));
                }
            }
            BeforeSnapshot::Patch(before)
        }
        _ => BeforeSnapshot::None,
    }
}

/// After a successful mutating tool call: persist FileChange + FileVersion
/// rows and return the `(path, diff)` pairs the caller should emit.
pub(crate) fn record_artifacts(
    state: &AppState,
    session_id: &str,
    turn_id: &str,
    step_id: &str,
    snapshot: &BeforeSnapshot,
    tool_name: &str,
    output: &str,
) -> Result<Vec<(String, String)>> {
    let mut diffs = Vec::new();

    match snapshot {
        BeforeSnapshot::Write {
            display,
            abs,
            before,
        } => {
            let after = read_file_best_effort(abs);
            if *before != after {
                let diff = unified_diff(display, before, &after);
                state
                    .store
                    .add_file_change(session_id, turn_id, step_id, display, &diff)?;
                state.store.ensure_base_version(
                    session_id,
                    display,
                    before,
                    Some(turn_id),
                    Some(step_id),
                )?;
                state.store.add_version(
                    session_id,
                    display,
                    &after,
                    tool_name,
                    Some(turn_id),
                    Some(step_id),
                )?;
                diffs.push((display.clone(), diff));
            }
        }
        BeforeSnapshot::Patch(before_map) => {
            let parsed: Value = match serde_json::from_str(output) {
                Ok(v) => v,
                Err(_) => return Ok(diffs),
            };
            if !parsed.get("applied").and_then(|v| v.as_bool()).unwrap_or(false) {
                return Ok(diffs);
            }
            let files = match parsed.get("files").and_then(|v| v.as_array()) {
                Some(f) => f,
                None => return Ok(diffs),
            };
            for file in files {
                let path = file.get("path").and_then(|v| v.as_str()).unwrap_or("");
                let diff = file.get("diff").and_then(|v| v.as_str()).unwrap_or("");
                if path.is_empty() || diff.is_empty() {
                    continue;
                }
                state
                    .store
                    .add_file_change(session_id, turn_id, step_id, path, diff)?;
                let before = before_map.get(path).cloned().unwrap_or_default();
                let after = match validate_path(&state.fs_root, path) {
                    Ok(abs) => read_file_best_effort(&abs),
                    Err(_) => String::new(),
                };
                state.store.ensure_base_version(
                    session_id,
                    path,
                    &before,
                    Some(turn_id),
                    Some(step_id),
                )?;
                state.store.add_version(
                    session_id,
                    path,
                    &after,
                    tool_name,
                    Some(turn_id),
                    Some(step_id),
                )?;
                diffs.push((path.to_string(), diff.to_string()));
            }
        }
        BeforeSnapshot::None => {}
    }

    Ok(diffs)
}

/// Opportunistic context capture: successful reads and fetches are
/// remembered as unpinned context items.
pub(crate) fn capture_context(state: &AppState, session_id: &str, tool_name: &str, args: &Value, output: &str) {
    match tool_name {
        "read_file" => {
            let raw = args.get("path").and_then(|v| v.as_str()).unwrap_or("");
            if raw.is_empty() {
                return;
            }
            let display = match validate_path(&state.fs_root, raw) {
                Ok(abs) => display_path(&state.fs_root, &abs),
                Err(_) => return,
            };
            if let Err(e) =
                state
                    .store
                    .upsert_context_item(session_id, "file", &display, &display, false)
            {
                tracing::warn!(error = %e, "context capture failed");
            }
        }
        "http_fetch" => {
            let url = serde_json::from_str::<Value>(output)
                .ok()
                .and_then(|v| v.get("url").and_then(|u| u.as_str()).map(String::from))
                .unwrap_or_default();
            if url.is_empty() {
                return;
            }
            if let Err(e) = state
                .store
                .upsert_context_item(session_id, "web", &url, &url, false)
            {
                tracing::warn!(error = %e, "context capture failed");
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assemble_orders_by_index_and_parses_args() {
        let mut bufs = BTreeMap::new();
        bufs.insert(
            1,
            ToolCallBuf {
                call_id: "tc_b".into(),
                tool_name: "search".into(),
                args: r#"{"query":"rust"}"#.into(),
            },
        );
        bufs.insert(
            0,
            ToolCallBuf {
                call_id: "tc_a".into(),
                tool_name: "read_file".into(),
                args: r#"{"path":"a.txt"}"#.into(),
            },
        );
        let calls = assemble_tool_calls(bufs);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].call_id, "tc_a");
        assert_eq!(calls[1].call_id, "tc_b");
        assert_eq!(calls[0].arguments["path"], "a.txt");
    }

    #[test]
    fn assemble_malformed_args_become_raw() {
        let mut bufs = BTreeMap::new();
        bufs.insert(
            0,
            ToolCallBuf {
                call_id: "tc_x".into(),
                tool_name: "write_file".into(),
                args: "{broken".into(),
            },
        );
        let calls = assemble_tool_calls(bufs);
        assert_eq!(calls[0].arguments["raw"], "{broken");
    }

    #[test]
    fn assemble_fills_missing_id_and_name() {
        let mut bufs = BTreeMap::new();
        bufs.insert(0, ToolCallBuf::default());
        let calls = assemble_tool_calls(bufs);
        assert!(calls[0].call_id.starts_with("tc_"));
        assert_eq!(calls[0].tool_name, "unknown");
        assert_eq!(calls[0].arguments, json!({}));
    }
}
