//! Row types returned by the store. All of them serialize directly into
//! API responses, so field names match the wire contract.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct SessionRow {
    pub id: String,
    pub title: String,
    pub model_override: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageRow {
    pub id: String,
    pub session_id: String,
    pub role: String,
    pub content: String,
    pub ts: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnRow {
    pub id: String,
    pub session_id: String,
    pub user_text: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepRow {
    pub id: String,
    pub turn_id: String,
    pub idx: i64,
    pub status: String,
    pub started_at: String,
    pub finished_at: Option<String>,
}

/// The persisted event envelope. `seq` is dense per session; `id` is the
/// global ordering used by the SSE bus.
#[derive(Debug, Clone, Serialize)]
pub struct EventRow {
    pub id: i64,
    pub seq: i64,
    pub ts: f64,
    #[serde(rename = "type")]
    pub kind: String,
    pub session_id: String,
    pub turn_id: String,
    pub step_id: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileChangeRow {
    pub id: String,
    pub session_id: String,
    pub turn_id: String,
    pub step_id: String,
    pub path: String,
    pub diff: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileVersionRow {
    pub id: String,
    pub session_id: String,
    pub path: String,
    pub idx: i64,
    pub sha256: String,
    pub content: String,
    pub note: String,
    pub turn_id: Option<String>,
    pub step_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TerminalChunkRow {
    pub id: i64,
    pub session_id: String,
    pub turn_id: String,
    pub step_id: String,
    pub tool_call_id: String,
    pub stream: String,
    pub text: String,
    pub ts: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PermissionRequestRow {
    pub id: String,
    pub session_id: String,
    pub turn_id: String,
    pub step_id: String,
    pub tool_name: String,
    pub input: serde_json::Value,
    pub status: String,
    pub scope: String,
    pub created_at: String,
    pub resolved_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextItemRow {
    pub id: String,
    pub session_id: String,
    pub kind: String,
    pub title: String,
    pub content_ref: String,
    pub pinned: bool,
    pub summary: Option<String>,
    pub summary_sha256: Option<String>,
    pub created_at: String,
}
