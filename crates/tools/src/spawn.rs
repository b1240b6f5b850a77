//! `spawn_subagent` — delegate a focused task to a bounded nested agent.
//!
//! The tool holds a [`SubagentLauncher`] reference rather than the runner
//! itself; the runner implements the trait, which breaks the runner↔tool
//! ownership cycle.

use std::sync::Arc;

use serde_json::Value;

use crate::{SubagentLauncher, Tool, ToolContext};

pub struct SpawnSubagentTool {
    launcher: Arc<dyn SubagentLauncher>,
}

impl SpawnSubagentTool {
    pub fn new(launcher: Arc<dyn SubagentLauncher>) -> Self {
        Self { launcher }
    }
}

#[async_trait::async_trait]
impl Tool for SpawnSubagentTool {
    fn name(&self) -> &str {
        "spawn_subagent"
    }

    fn description(&self) -> &str {
        "Spawn a subagent to work on a focused task. The subagent runs as a \
         nested execution tree and returns its final result."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "task": { "type": "string", "description": "Task for the subagent" },
                "label": { "type": "string", "description": "Optional short label for UI" }
            },
            "required": ["task"]
        })
    }

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> String {
        let task = args.get("task").and_then(|v| v.as_str()).unwrap_or("");
        let label = args.get("label").and_then(|v| v.as_str());

        if task.is_empty() {
            return "Error: task is required".into();
        }
        if ctx.session_id.is_empty()
            || ctx.turn_id.is_empty()
            || ctx.step_id.is_empty()
            || ctx.parent_tool_call_id.is_empty()
        {
            return "Error: spawn_subagent missing execution context".into();
        }

        self.launcher.run_subagent(ctx, task, label).await
    }
}
