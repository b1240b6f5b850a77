//! Configuration model, deserialized from `wheelhouse.toml`.
//!
//! Every field has a serde default so a missing or empty config file yields
//! a runnable (if LLM-less) server. Paths are resolved relative to the
//! process working directory.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Permission policy for a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    Deny,
    Ask,
    Allow,
}

impl Policy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Policy::Deny => "deny",
            Policy::Ask => "ask",
            Policy::Allow => "allow",
        }
    }

    pub fn parse(s: &str) -> Option<Policy> {
        match s {
            "deny" => Some(Policy::Deny),
            "ask" => Some(Policy::Ask),
            "allow" => Some(Policy::Allow),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub permissions: PermissionsConfig,
    #[serde(default)]
    pub sse: SseConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Database file. Defaults to `<data_dir>/wheelhouse.db`.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    /// Sandbox root for all filesystem tools. Defaults to
    /// `<data_dir>/workspace`.
    #[serde(default)]
    pub fs_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_llm_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_subagent_iterations")]
    pub subagent_max_iterations: usize,
    /// Number of trailing history messages included in the prompt.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// Truncation limit for tool output carried in events. The full text
    /// still goes back to the model.
    #[serde(default = "default_event_output_limit")]
    pub event_output_limit: usize,
    /// Pinned context items larger than this get summarized.
    #[serde(default = "default_summary_trigger")]
    pub summary_trigger_chars: usize,
    /// Maximum file size recorded as a FileVersion snapshot.
    #[serde(default = "default_version_max_bytes")]
    pub version_max_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PermissionsConfig {
    #[serde(default = "default_policy")]
    pub default_policy: Policy,
    #[serde(default = "default_permission_timeout")]
    pub wait_timeout_secs: u64,
    /// Per-tool policy overrides, e.g. `write_file = "ask"`.
    #[serde(default)]
    pub tool_policy: HashMap<String, Policy>,
    /// Per-tool enable flags; a disabled tool is always denied.
    #[serde(default)]
    pub tool_enabled: HashMap<String, bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SseConfig {
    #[serde(default = "default_heartbeat")]
    pub heartbeat_secs: u64,
    #[serde(default = "default_sse_wait")]
    pub wait_timeout_secs: u64,
    #[serde(default = "default_replay_limit")]
    pub replay_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    #[serde(default = "default_csp")]
    pub csp: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub api_key: String,
}

impl Config {
    pub fn resolved_db_path(&self) -> PathBuf {
        self.data
            .db_path
            .clone()
            .unwrap_or_else(|| self.data.data_dir.join("wheelhouse.db"))
    }

    pub fn resolved_fs_root(&self) -> PathBuf {
        self.data
            .fs_root
            .clone()
            .unwrap_or_else(|| self.data.data_dir.join("workspace"))
    }

    /// Whether a tool is enabled. Unknown tools default to enabled; the
    /// permission gate still applies.
    pub fn tool_enabled(&self, tool_name: &str) -> bool {
        self.permissions
            .tool_enabled
            .get(tool_name)
            .copied()
            .unwrap_or(true)
    }

    /// The configured policy for a tool (override or default).
    pub fn tool_policy(&self, tool_name: &str) -> Policy {
        self.permissions
            .tool_policy
            .get(tool_name)
            .copied()
            .unwrap_or(self.permissions.default_policy)
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    4096
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_llm_timeout() -> u64 {
    120
}
fn default_max_iterations() -> usize {
    20
}
fn default_subagent_iterations() -> usize {
    12
}
fn default_history_window() -> usize {
    50
}
fn default_event_output_limit() -> usize {
    2000
}
fn default_summary_trigger() -> usize {
    4000
}
fn default_version_max_bytes() -> usize {
    1024 * 1024
}
fn default_policy() -> Policy {
    Policy::Ask
}
fn default_permission_timeout() -> u64 {
    120
}
fn default_heartbeat() -> u64 {
    15
}
fn default_sse_wait() -> u64 {
    15
}
fn default_replay_limit() -> usize {
    2000
}
fn default_csp() -> String {
    "default-src 'self'".into()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}
impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            db_path: None,
            fs_root: None,
        }
    }
}
impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            model: default_model(),
            request_timeout_secs: default_llm_timeout(),
        }
    }
}
impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            subagent_max_iterations: default_subagent_iterations(),
            history_window: default_history_window(),
            event_output_limit: default_event_output_limit(),
            summary_trigger_chars: default_summary_trigger(),
            version_max_bytes: default_version_max_bytes(),
        }
    }
}
impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            default_policy: default_policy(),
            wait_timeout_secs: default_permission_timeout(),
            tool_policy: HashMap::new(),
            tool_enabled: HashMap::new(),
        }
    }
}
impl Default for SseConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: default_heartbeat(),
            wait_timeout_secs: default_sse_wait(),
            replay_limit: default_replay_limit(),
        }
    }
}
impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            csp: default_csp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.server.port, 4096);
        assert_eq!(cfg.runner.max_iterations, 20);
        assert_eq!(cfg.permissions.default_policy, Policy::Ask);
        assert_eq!(cfg.resolved_db_path(), PathBuf::from("data/wheelhouse.db"));
        assert_eq!(cfg.resolved_fs_root(), PathBuf::from("data/workspace"));
    }

    #[test]
    fn tool_policy_override_wins() {
        let cfg: Config = toml::from_str(
            r#"
            [permissions]
            default_policy = "ask"

            [permissions.tool_policy]
            read_file = "allow"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.tool_policy("read_file"), Policy::Allow);
        assert_eq!(cfg.tool_policy("write_file"), Policy::Ask);
    }

    #[test]
    fn tool_enabled_flag() {
        let cfg: Config = toml::from_str(
            r#"
            [permissions.tool_enabled]
            http_fetch = false
            "#,
        )
        .unwrap();
        assert!(!cfg.tool_enabled("http_fetch"));
        assert!(cfg.tool_enabled("read_file"));
    }

    #[test]
    fn policy_parse_round_trip() {
        for p in [Policy::Deny, Policy::Ask, Policy::Allow] {
            assert_eq!(Policy::parse(p.as_str()), Some(p));
        }
        assert_eq!(Policy::parse("bogus"), None);
    }

    #[test]
    fn explicit_paths_respected() {
        let cfg: Config = toml::from_str(
            r#"
            [data]
            data_dir = "/tmp/wh"
            db_path = "/tmp/other.db"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.resolved_db_path(), PathBuf::from("/tmp/other.db"));
        assert_eq!(cfg.resolved_fs_root(), PathBuf::from("/tmp/wh/workspace"));
    }
}
