//! Bounded nested agent loop behind the `spawn_subagent` tool.
//!
//! A subagent is a reduced, non-streaming variant of the turn loop: its
//! own iteration cap, a tool set without `spawn_subagent` (no nesting),
//! and progress surfaced through `subagent` / `subagent_block` events
//! that name the parent tool call. The parent-visible result is the
//! subagent's final text.

use std::time::{Duration, Instant};

use serde_json::{json, Value};

use wh_domain::config::Policy;
use wh_domain::tool::Message;
use wh_providers::ChatRequest;
use wh_store::new_id;
use wh_tools::{classify_result, SubagentLauncher, ToolContext};

use crate::runtime::{context, truncate_str, turn};
use crate::state::AppState;

const TASK_LABEL_CHARS: usize = 40;

pub struct SubagentRunner {
    state: AppState,
}

impl SubagentRunner {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    fn publish_status(
        &self,
        ctx: &ToolContext,
        subagent_id: &str,
        status: &str,
        label: &str,
        task: &str,
        result: Option<&str>,
        error: Option<&str>,
    ) {
        let payload = json!({
            "parent_tool_call_id": ctx.parent_tool_call_id,
            "subagent_id": subagent_id,
            "status": status,
            "label": label,
            "task": task,
            "result": result.unwrap_or(""),
            "error": error.unwrap_or(""),
        });
        if let Err(e) = self.state.bus.publish(
            &ctx.session_id,
            &ctx.turn_id,
            &ctx.step_id,
            "subagent",
            &payload,
        ) {
            tracing::warn!(error = %e, "failed to publish subagent status");
        }
    }

    fn publish_block(&self, ctx: &ToolContext, subagent_id: &str, block: Value) {
        let payload = json!({
            "parent_tool_call_id": ctx.parent_tool_call_id,
            "subagent_id": subagent_id,
            "block": block,
        });
        if let Err(e) = self.state.bus.publish(
            &ctx.session_id,
            &ctx.turn_id,
            &ctx.step_id,
            "subagent_block",
            &payload,
        ) {
            tracing::warn!(error = %e, "failed to publish subagent block");
        }
    }

    async fn run_inner(&self, ctx: &ToolContext, task: &str, subagent_id: &str) -> Result<String, String> {
        let provider = self
            .state
            .provider
            .clone()
            .ok_or_else(|| "no LLM provider configured".to_string())?;

        let registry = turn::subagent_registry(&self.state);
        let tool_defs = registry.definitions();

        let mut system = context::build_system_prompt(&self.state, &ctx.session_id).await;
        system.push_str(
            "\n\n# Subagent\n\
             You are a subagent running inside a parent tool call.\n\n\
             Rules:\n\
             - Stay focused on the given task.\n\
             - Return a clear final answer.\n\
             - You may use tools if needed; file writes and patches may require approval.\n\n\
             Subagents cannot spawn further subagents.",
        );

        let mut messages = vec![Message::system(system), Message::user(task)];
        let mut final_text = String::new();
        let max_iterations = self.state.config.runner.subagent_max_iterations;

        for iteration in 1..=max_iterations {
            let req = ChatRequest {
                messages: messages.clone(),
                tools: tool_defs.clone(),
                temperature: Some(0.2),
                max_tokens: None,
                model: None,
            };

            let resp = provider.chat(&req).await.map_err(|e| e.to_string())?;

            if resp.tool_calls.is_empty() {
                final_text = resp.content.trim().to_string();
                if !final_text.is_empty() {
                    self.publish_block(
                        ctx,
                        subagent_id,
                        json!({
                            "id": format!("assistant_{subagent_id}_{iteration}"),
                            "type": "assistant",
                            "text": final_text,
                        }),
                    );
                }
                break;
            }

            messages.push(Message::assistant_tool_calls(&resp.content, &resp.tool_calls));

            for tc in &resp.tool_calls {
                let output = self.run_subagent_tool(ctx, subagent_id, &registry, tc).await;
                messages.push(Message::tool_result(&tc.call_id, &output));
            }
        }

        if final_text.is_empty() {
            final_text = "(no response)".to_string();
        }
        Ok(final_text)
    }

    /// One gated tool call inside the subagent loop. Mirrors the parent
    /// runner's dispatch but reports through `subagent_block` events.
    async fn run_subagent_tool(
        &self,
        ctx: &ToolContext,
        subagent_id: &str,
        registry: &wh_tools::ToolRegistry,
        tc: &wh_domain::tool::ToolCall,
    ) -> String {
        let tool_name = tc.tool_name.as_str();
        let limit = self.state.config.runner.event_output_limit;

        let fail = |err: String| {
            self.publish_block(
                ctx,
                subagent_id,
                json!({
                    "id": tc.call_id,
                    "type": "tool_call",
                    "tool_call_id": tc.call_id,
                    "tool_name": tool_name,
                    "status": "error",
                    "input": tc.arguments,
                    "output": "",
                    "error": truncate_str(&err, limit),
                    "duration_ms": 0,
                }),
            );
            err
        };

        if !self.state.config.tool_enabled(tool_name) {
            return fail(format!("Tool '{tool_name}' is disabled by configuration"));
        }

        let mut policy = self.state.gate.effective_policy(&ctx.session_id, tool_name);

        if policy == Policy::Ask {
            let ticket = match self.state.gate.create_request(
                &ctx.session_id,
                &ctx.turn_id,
                &ctx.step_id,
                tool_name,
                &tc.arguments,
            ) {
                Ok(t) => t,
                Err(e) => return fail(format!("Error: {e}")),
            };
            self.publish_block(
                ctx,
                subagent_id,
                json!({
                    "id": tc.call_id,
                    "type": "tool_call",
                    "tool_call_id": tc.call_id,
                    "tool_name": tool_name,
                    "status": "permission_required",
                    "input": tc.arguments,
                    "permission_request_id": ticket.request_id,
                }),
            );
            let timeout = Duration::from_secs(self.state.config.permissions.wait_timeout_secs);
            let decision = self.state.gate.wait(ticket, timeout).await;
            policy = if decision.approved {
                Policy::Allow
            } else {
                Policy::Deny
            };
        }

        if policy == Policy::Deny {
            return fail(format!("Permission denied for tool '{tool_name}'"));
        }

        self.publish_block(
            ctx,
            subagent_id,
            json!({
                "id": tc.call_id,
                "type": "tool_call",
                "tool_call_id": tc.call_id,
                "tool_name": tool_name,
                "status": "running",
                "input": tc.arguments,
            }),
        );

        let snapshot = turn::snapshot_before(&self.state, tool_name, &tc.arguments);
        let started = Instant::now();
        let output = turn::execute_tool(
            &self.state,
            registry,
            tc,
            &ctx.step_id,
            &ctx.turn_id,
            &ctx.session_id,
        )
        .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let (ok, error_text) = classify_result(tool_name, &output);

        self.publish_block(
            ctx,
            subagent_id,
            json!({
                "id": tc.call_id,
                "type": "tool_call",
                "tool_call_id": tc.call_id,
                "tool_name": tool_name,
                "status": if ok { "completed" } else { "error" },
                "input": tc.arguments,
                "output": if ok { truncate_str(&output, limit) } else { String::new() },
                "error": if ok { String::new() } else { truncate_str(&error_text, limit) },
                "duration_ms": duration_ms,
            }),
        );

        if ok {
            match turn::record_artifacts(
                &self.state,
                &ctx.session_id,
                &ctx.turn_id,
                &ctx.step_id,
                &snapshot,
                tool_name,
                &output,
            ) {
                Ok(diffs) => {
                    for (path, diff) in diffs {
                        self.publish_block(
                            ctx,
                            subagent_id,
                            json!({
                                "id": format!("diff_{}_{}", tc.call_id, new_id("d")),
                                "type": "diff",
                                "tool_call_id": tc.call_id,
                                "path": path,
                                "diff": diff,
                            }),
                        );
                    }
                }
                Err(e) => tracing::warn!(error = %e, "subagent artifact recording failed"),
            }
            turn::capture_context(&self.state, &ctx.session_id, tool_name, &tc.arguments, &output);
        }

        output
    }
}

#[async_trait::async_trait]
impl SubagentLauncher for SubagentRunner {
    async fn run_subagent(&self, ctx: &ToolContext, task: &str, label: Option<&str>) -> String {
        let subagent_id = new_id("sub");
        let trimmed_task = task.trim();
        let display_label = match label.map(str::trim).filter(|l| !l.is_empty()) {
            Some(l) => l.to_string(),
            None => truncate_str(trimmed_task, TASK_LABEL_CHARS),
        };

        self.publish_status(ctx, &subagent_id, "start", &display_label, task, None, None);

        match self.run_inner(ctx, task, &subagent_id).await {
            Ok(final_text) => {
                self.publish_status(
                    ctx,
                    &subagent_id,
                    "end",
                    &display_label,
                    task,
                    Some(&final_text),
                    None,
                );
                final_text
            }
            Err(err) => {
                self.publish_block(
                    ctx,
                    &subagent_id,
                    json!({
                        "id": format!("error_{subagent_id}"),
                        "type": "error",
                        "text": err,
                        "code": "SUBAGENT_ERROR",
                    }),
                );
                self.publish_status(
                    ctx,
                    &subagent_id,
                    "error",
                    &display_label,
                    task,
                    None,
                    Some(&err),
                );
                format!("Error: {err}")
            }
        }
    }
}
