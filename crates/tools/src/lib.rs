//! Callable tools exposed to the LLM.
//!
//! Each tool is a named, schema-described unit returning plain text. A
//! result that begins with `Error` (or, for JSON-returning tools, carries
//! an `error` field or `applied:false`) is classified as a failure — the
//! text is still fed back to the model so it can self-correct.

mod fs_ops;
mod patch;
mod path;
mod spawn;
mod web;

pub use fs_ops::{ReadFileTool, WriteFileTool};
pub use patch::{extract_files_from_patch, ApplyPatchTool, PatchFile};
pub use path::{display_path, validate_path};
pub use spawn::SpawnSubagentTool;
pub use web::{HttpFetchTool, SearchTool};

use std::sync::Arc;

use serde_json::Value;

use wh_domain::tool::ToolDefinition;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Execution context threaded into each tool invocation.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub session_id: String,
    pub turn_id: String,
    pub step_id: String,
    pub parent_tool_call_id: String,
}

/// A callable unit the model may invoke.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema describing the accepted arguments.
    fn parameters(&self) -> Value;

    /// Run the tool. Failures are reported as `Error: ...` strings, never
    /// as panics — the output always goes back to the model.
    async fn execute(&self, args: &Value, ctx: &ToolContext) -> String;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// Delegation seam for the `spawn_subagent` tool: the turn runner
/// implements this, the tool only holds the interface. Keeps the tool
/// unit-testable with a stub.
#[async_trait::async_trait]
pub trait SubagentLauncher: Send + Sync {
    async fn run_subagent(&self, ctx: &ToolContext, task: &str, label: Option<&str>) -> String;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Ordered collection of tools, looked up by name at dispatch time.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Argument validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Validate free-form JSON arguments against a tool's declared schema.
///
/// Checks that `args` is an object, that every `required` member is
/// present, and that members with a declared scalar `type` match it.
/// Returns human-readable problems; empty means valid.
pub fn validate_params(schema: &Value, args: &Value) -> Vec<String> {
    let mut errors = Vec::new();

    let obj = match args.as_object() {
        Some(o) => o,
        None => return vec!["arguments must be a JSON object".to_string()],
    };

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for name in required.iter().filter_map(|v| v.as_str()) {
            if !obj.contains_key(name) {
                errors.push(format!("missing required parameter '{name}'"));
            }
        }
    }

    if let Some(props) = schema.get("properties").and_then(|p| p.as_object()) {
        for (name, value) in obj {
            let Some(expected) = props
                .get(name)
                .and_then(|p| p.get("type"))
                .and_then(|t| t.as_str())
            else {
                continue;
            };
            let ok = match expected {
                "string" => value.is_string(),
                "integer" => value.is_i64() || value.is_u64(),
                "number" => value.is_number(),
                "boolean" => value.is_boolean(),
                "object" => value.is_object(),
                "array" => value.is_array(),
                _ => true,
            };
            if !ok {
                errors.push(format!("parameter '{name}' must be of type {expected}"));
            }
        }
    }

    errors
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Result classification
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn looks_like_error(text: &str) -> bool {
    let s = text.trim_start();
    s.starts_with("Error:") || s.starts_with("Error ")
}

/// Decide ok/error for a tool output. JSON-returning tools (`http_fetch`,
/// `apply_patch`) report failures inside the document, so a string-prefix
/// check alone is not enough. Returns `(ok, error_text)`.
pub fn classify_result(tool_name: &str, output: &str) -> (bool, String) {
    if tool_name == "http_fetch" {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(output) {
            if let Some(err) = map.get("error") {
                if !err.is_null() {
                    let text = err.as_str().map(String::from).unwrap_or_else(|| err.to_string());
                    return (false, text);
                }
            }
        }
    }

    if tool_name == "apply_patch" {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(output) {
            if !map.get("applied").and_then(|v| v.as_bool()).unwrap_or(false) {
                let err = map
                    .get("error")
                    .and_then(|v| v.as_str())
                    .or_else(|| map.get("stderr").and_then(|v| v.as_str()))
                    .or_else(|| map.get("stdout").and_then(|v| v.as_str()))
                    .filter(|s| !s.is_empty())
                    .unwrap_or("Patch not applied");
                return (false, err.to_string());
            }
        }
    }

    if looks_like_error(output) {
        return (false, output.to_string());
    }
    (true, String::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait::async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo the input back."
        }
        fn parameters(&self) -> Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string"},
                    "count": {"type": "integer"}
                },
                "required": ["text"]
            })
        }
        async fn execute(&self, args: &Value, _ctx: &ToolContext) -> String {
            args["text"].as_str().unwrap_or("").to_string()
        }
    }

    #[test]
    fn registry_lookup_and_definitions() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        assert!(reg.get("echo").is_some());
        assert!(reg.get("missing").is_none());
        let defs = reg.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "echo");
    }

    #[test]
    fn validate_params_flags_missing_required() {
        let tool = EchoTool;
        let errors = validate_params(&tool.parameters(), &serde_json::json!({}));
        assert_eq!(errors, vec!["missing required parameter 'text'"]);
    }

    #[test]
    fn validate_params_flags_type_mismatch() {
        let tool = EchoTool;
        let errors = validate_params(
            &tool.parameters(),
            &serde_json::json!({"text": "hi", "count": "three"}),
        );
        assert_eq!(errors, vec!["parameter 'count' must be of type integer"]);
    }

    #[test]
    fn validate_params_rejects_non_object() {
        let tool = EchoTool;
        let errors = validate_params(&tool.parameters(), &serde_json::json!("just a string"));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn classify_plain_error_prefix() {
        let (ok, err) = classify_result("read_file", "Error: File not found: x.txt");
        assert!(!ok);
        assert!(err.contains("File not found"));
    }

    #[test]
    fn classify_http_fetch_json_error() {
        let out = r#"{"url": "https://x", "error": "connection refused"}"#;
        let (ok, err) = classify_result("http_fetch", out);
        assert!(!ok);
        assert_eq!(err, "connection refused");
    }

    #[test]
    fn classify_apply_patch_not_applied() {
        let out = r#"{"applied": false, "files": [], "stderr": "corrupt patch"}"#;
        let (ok, err) = classify_result("apply_patch", out);
        assert!(!ok);
        assert_eq!(err, "corrupt patch");
    }

    #[test]
    fn classify_success() {
        let (ok, err) = classify_result("read_file", "file contents here");
        assert!(ok);
        assert!(err.is_empty());

        let out = r#"{"applied": true, "files": [{"path": "a", "diff": "+x"}]}"#;
        let (ok, _) = classify_result("apply_patch", out);
        assert!(ok);
    }
}
