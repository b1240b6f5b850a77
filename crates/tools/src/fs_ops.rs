//! File read/write tools, constrained to the sandbox root.

use std::path::PathBuf;

use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::path::{display_path, validate_path};
use crate::{Tool, ToolContext};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// read_file
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ReadFileTool {
    root: PathBuf,
}

impl ReadFileTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait::async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file at the given path."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "The file path to read" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: &Value, _ctx: &ToolContext) -> String {
        let raw = args.get("path").and_then(|v| v.as_str()).unwrap_or("");
        let resolved = match validate_path(&self.root, raw) {
            Ok(p) => p,
            Err(e) => return format!("Error: {e}"),
        };
        let display = display_path(&self.root, &resolved);

        match fs::metadata(&resolved).await {
            Ok(meta) if !meta.is_file() => return format!("Error: Not a file: {display}"),
            Err(_) => return format!("Error: File not found: {display}"),
            _ => {}
        }

        match fs::read_to_string(&resolved).await {
            Ok(content) => content,
            Err(e) => format!("Error reading file: {e}"),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// write_file
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct WriteFileTool {
    root: PathBuf,
}

impl WriteFileTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait::async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file at the given path. Creates parent directories if needed."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "The file path to write to" },
                "content": { "type": "string", "description": "The content to write" }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: &Value, _ctx: &ToolContext) -> String {
        let raw = args.get("path").and_then(|v| v.as_str()).unwrap_or("");
        let content = args.get("content").and_then(|v| v.as_str()).unwrap_or("");

        let resolved = match validate_path(&self.root, raw) {
            Ok(p) => p,
            Err(e) => return format!("Error: {e}"),
        };
        let display = display_path(&self.root, &resolved);

        if let Some(parent) = resolved.parent() {
            if let Err(e) = fs::create_dir_all(parent).await {
                return format!("Error: failed to create parent directory: {e}");
            }
        }

        // Atomic write: temp sibling, flush + sync, rename into place. The
        // model never observes a half-written file.
        let tmp_name = format!(
            ".{}.{}.tmp",
            resolved.file_name().unwrap_or_default().to_string_lossy(),
            uuid::Uuid::new_v4().as_simple()
        );
        let tmp_path = resolved.with_file_name(tmp_name);

        let write_result = async {
            let mut file = fs::File::create(&tmp_path).await?;
            file.write_all(content.as_bytes()).await?;
            file.flush().await?;
            file.sync_data().await?;
            fs::rename(&tmp_path, &resolved).await
        }
        .await;

        match write_result {
            Ok(()) => format!("Successfully wrote {} bytes to {display}", content.len()),
            Err(e) => {
                let tmp = tmp_path.clone();
                tokio::spawn(async move {
                    let _ = fs::remove_file(&tmp).await;
                });
                format!("Error writing file: {e}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ctx() -> ToolContext {
        ToolContext::default()
    }

    #[tokio::test]
    async fn write_then_read_round_trip() {
        let ws = TempDir::new().unwrap();
        let write = WriteFileTool::new(ws.path().to_path_buf());
        let read = ReadFileTool::new(ws.path().to_path_buf());

        let out = write
            .execute(
                &serde_json::json!({"path": "notes.txt", "content": "x"}),
                &ctx(),
            )
            .await;
        assert!(out.starts_with("Successfully wrote 1 bytes"), "{out}");

        let content = read
            .execute(&serde_json::json!({"path": "notes.txt"}), &ctx())
            .await;
        assert_eq!(content, "x");
    }

    #[tokio::test]
    async fn write_creates_parent_dirs() {
        let ws = TempDir::new().unwrap();
        let write = WriteFileTool::new(ws.path().to_path_buf());
        let out = write
            .execute(
                &serde_json::json!({"path": "a/b/c.txt", "content": "deep"}),
                &ctx(),
            )
            .await;
        assert!(out.starts_with("Successfully"), "{out}");
        assert_eq!(
            std::fs::read_to_string(ws.path().join("a/b/c.txt")).unwrap(),
            "deep"
        );
    }

    #[tokio::test]
    async fn identical_write_is_idempotent() {
        let ws = TempDir::new().unwrap();
        let write = WriteFileTool::new(ws.path().to_path_buf());
        let args = serde_json::json!({"path": "same.txt", "content": "stable"});
        let first = write.execute(&args, &ctx()).await;
        let second = write.execute(&args, &ctx()).await;
        assert_eq!(first, second);
        assert_eq!(
            std::fs::read_to_string(ws.path().join("same.txt")).unwrap(),
            "stable"
        );
    }

    #[tokio::test]
    async fn read_missing_file_is_error() {
        let ws = TempDir::new().unwrap();
        let read = ReadFileTool::new(ws.path().to_path_buf());
        let out = read
            .execute(&serde_json::json!({"path": "ghost.txt"}), &ctx())
            .await;
        assert!(out.starts_with("Error: File not found"), "{out}");
    }

    #[tokio::test]
    async fn sandbox_escape_is_error_and_no_io() {
        let ws = TempDir::new().unwrap();
        let write = WriteFileTool::new(ws.path().to_path_buf());
        let out = write
            .execute(
                &serde_json::json!({"path": "../outside.txt", "content": "nope"}),
                &ctx(),
            )
            .await;
        assert!(out.starts_with("Error:"), "{out}");
        assert!(!ws.path().parent().unwrap().join("outside.txt").exists());
    }

    #[tokio::test]
    async fn no_temp_files_left_behind() {
        let ws = TempDir::new().unwrap();
        let write = WriteFileTool::new(ws.path().to_path_buf());
        write
            .execute(
                &serde_json::json!({"path": "clean.txt", "content": "done"}),
                &ctx(),
            )
            .await;
        let leftovers: Vec<_> = std::fs::read_dir(ws.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
