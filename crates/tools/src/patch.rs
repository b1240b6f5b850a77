//! `apply_patch` — apply a unified diff to the workspace.
//!
//! Every path named by the diff is validated against the allowed root
//! before any I/O. Application itself delegates to `git apply`, which is
//! atomic across the whole patch: either every hunk lands or none do.

use std::path::{Component, Path, PathBuf};
use std::process::Stdio;

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::{Tool, ToolContext};

/// One file section of a unified diff.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PatchFile {
    pub path: String,
    pub diff: String,
}

/// Split a unified diff into per-file sections, keyed by the `b/` path.
/// Patches without `diff --git` headers fall back to the `+++ b/` line.
pub fn extract_files_from_patch(patch: &str) -> Vec<PatchFile> {
    let diff_start = regex::Regex::new(r"^diff --git a/(.+?) b/(.+)$").unwrap();
    let plus_line = regex::Regex::new(r"^\+\+\+ b/(.+)$").unwrap();

    let mut files: Vec<PatchFile> = Vec::new();
    let mut cur_path: Option<String> = None;
    let mut cur_lines: Vec<&str> = Vec::new();

    let mut flush = |path: &mut Option<String>, lines: &mut Vec<&str>| {
        if let Some(p) = path.take() {
            if !lines.is_empty() {
                files.push(PatchFile {
                    path: p,
                    diff: format!("{}\n", lines.join("\n")),
                });
            }
        }
        lines.clear();
    };

    for line in patch.lines() {
        if let Some(caps) = diff_start.captures(line) {
            flush(&mut cur_path, &mut cur_lines);
            cur_path = Some(caps[2].to_string());
            cur_lines.push(line);
            continue;
        }
        if cur_path.is_none() {
            if let Some(caps) = plus_line.captures(line) {
                cur_path = Some(caps[1].to_string());
            }
        }
        cur_lines.push(line);
    }
    flush(&mut cur_path, &mut cur_lines);

    if files.is_empty() {
        let diff = if patch.ends_with('\n') {
            patch.to_string()
        } else {
            format!("{patch}\n")
        };
        return vec![PatchFile {
            path: String::new(),
            diff,
        }];
    }
    files
}

/// Reject absolute paths, drive prefixes, and `..` segments.
fn validate_rel_path(path: &str) -> Option<String> {
    if path.is_empty() {
        return None;
    }
    let bytes = path.as_bytes();
    if path.starts_with('/') || path.starts_with('\\') {
        return Some("absolute paths are not allowed".into());
    }
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return Some("absolute paths are not allowed".into());
    }
    if Path::new(path)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Some("path traversal is not allowed".into());
    }
    None
}

pub struct ApplyPatchTool {
    allowed_root: PathBuf,
}

impl ApplyPatchTool {
    pub fn new(allowed_root: PathBuf) -> Self {
        Self { allowed_root }
    }

    fn refuse(error: String, files: &[PatchFile]) -> String {
        serde_json::json!({
            "applied": false,
            "error": error,
            "files": files,
        })
        .to_string()
    }
}

#[async_trait::async_trait]
impl Tool for ApplyPatchTool {
    fn name(&self) -> &str {
        "apply_patch"
    }

    fn description(&self) -> &str {
        "Apply a unified diff patch to the workspace (all files or none)."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "patch": { "type": "string", "description": "Unified diff to apply" },
                "cwd": { "type": "string", "description": "Working directory for application" }
            },
            "required": ["patch"]
        })
    }

    async fn execute(&self, args: &Value, _ctx: &ToolContext) -> String {
        let patch = args.get("patch").and_then(|v| v.as_str()).unwrap_or("");
        let files = extract_files_from_patch(patch);

        let allowed_root = match self.allowed_root.canonicalize() {
            Ok(r) => r,
            Err(e) => return Self::refuse(format!("cannot resolve allowed root: {e}"), &files),
        };

        let cwd = match args.get("cwd").and_then(|v| v.as_str()) {
            Some(raw) => {
                let p = PathBuf::from(raw);
                match p.canonicalize() {
                    Ok(c) if c.starts_with(&allowed_root) => c,
                    Ok(_) => {
                        return Self::refuse("cwd is outside allowed root".into(), &files);
                    }
                    Err(e) => return Self::refuse(format!("cannot resolve cwd: {e}"), &files),
                }
            }
            None => allowed_root.clone(),
        };

        // Validate every path named by the patch before touching anything.
        for f in &files {
            if let Some(err) = validate_rel_path(&f.path) {
                return Self::refuse(format!("invalid path in patch: {err}"), &files);
            }
            if !f.path.is_empty() {
                // Paths contain no '..' at this point, so joining onto the
                // canonical cwd cannot escape; the check guards symlinked
                // intermediate directories.
                let candidate = cwd.join(&f.path);
                let probe = deepest_existing(&candidate);
                match probe.canonicalize() {
                    Ok(resolved) if resolved.starts_with(&allowed_root) => {}
                    _ => {
                        return Self::refuse(
                            "invalid path in patch: path is outside allowed root".into(),
                            &files,
                        );
                    }
                }
            }
        }

        let mut child = match Command::new("git")
            .arg("apply")
            .arg("--whitespace=nowarn")
            .arg("-")
            .current_dir(&cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(c) => c,
            Err(e) => return Self::refuse(format!("failed to spawn git apply: {e}"), &files),
        };

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(patch.as_bytes()).await {
                return Self::refuse(format!("failed to write patch to git apply: {e}"), &files);
            }
            drop(stdin);
        }

        let output = match child.wait_with_output().await {
            Ok(o) => o,
            Err(e) => return Self::refuse(format!("git apply failed: {e}"), &files),
        };

        let applied = output.status.success();
        serde_json::json!({
            "applied": applied,
            "files": files,
            "stdout": String::from_utf8_lossy(&output.stdout),
            "stderr": String::from_utf8_lossy(&output.stderr),
            "exit_code": output.status.code(),
        })
        .to_string()
    }
}

fn deepest_existing(path: &Path) -> PathBuf {
    let mut current = path;
    while !current.exists() {
        match current.parent() {
            Some(parent) => current = parent,
            None => break,
        }
    }
    current.to_path_buf()
}
