//! Tool permission gate.
//!
//! Policy levels:
//! - `deny`: tool execution is blocked
//! - `allow`: tool executes without prompt
//! - `ask`: a permission-required event is emitted and the turn blocks
//!   until the UI resolves the request (or the wait times out)
//!
//! Decisions carry a scope: `once` applies to the single call, `session`
//! is remembered in memory for the session's lifetime, `always` is
//! persisted to the durable tool policy table.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;

use wh_domain::config::{Config, Policy};
use wh_domain::{Error, Result};
use wh_store::{PermissionRequestRow, Store};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Lifetime of a permission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Once,
    Session,
    Always,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Once => "once",
            Scope::Session => "session",
            Scope::Always => "always",
        }
    }

    pub fn parse(s: &str) -> Option<Scope> {
        match s {
            "once" => Some(Scope::Once),
            "session" => Some(Scope::Session),
            "always" => Some(Scope::Always),
            _ => None,
        }
    }
}

/// The outcome delivered to a blocked tool call.
#[derive(Debug, Clone, Copy)]
pub struct PermissionDecision {
    pub approved: bool,
    pub scope: Scope,
}

/// Handle returned by [`PermissionGate::create_request`]; pairs the
/// persisted request id with the completion channel the waiter blocks on.
pub struct PermissionTicket {
    pub request_id: String,
    rx: oneshot::Receiver<PermissionDecision>,
}

struct PendingEntry {
    tx: oneshot::Sender<PermissionDecision>,
    session_id: String,
    tool_name: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Gate
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct PermissionGate {
    store: Arc<Store>,
    config: Arc<Config>,
    pending: Mutex<HashMap<String, PendingEntry>>,
    /// session_id -> tool_name -> policy, for `session`-scoped approvals.
    session_overrides: RwLock<HashMap<String, HashMap<String, Policy>>>,
}

impl PermissionGate {
    pub fn new(store: Arc<Store>, config: Arc<Config>) -> Self {
        Self {
            store,
            config,
            pending: Mutex::new(HashMap::new()),
            session_overrides: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve the effective policy for a tool call. First match wins:
    /// disabled tool, orchestration exemption, session override, durable
    /// table, configured default.
    pub fn effective_policy(&self, session_id: &str, tool_name: &str) -> Policy {
        if !self.config.tool_enabled(tool_name) {
            return Policy::Deny;
        }

        // Compute-only orchestration; the subagent's own tool calls still
        // go through the gate individually.
        if tool_name == "spawn_subagent" {
            return Policy::Allow;
        }

        if let Some(policy) = self
            .session_overrides
            .read()
            .get(session_id)
            .and_then(|m| m.get(tool_name))
        {
            return *policy;
        }

        match self.store.get_tool_policies() {
            Ok(policies) => {
                if let Some(policy) = policies.get(tool_name) {
                    return *policy;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to load durable tool policies");
            }
        }

        self.config.tool_policy(tool_name)
    }

    /// Persist a pending request and register its completion handle.
    pub fn create_request(
        &self,
        session_id: &str,
        turn_id: &str,
        step_id: &str,
        tool_name: &str,
        input: &serde_json::Value,
    ) -> Result<PermissionTicket> {
        let row = self
            .store
            .create_permission_request(session_id, turn_id, step_id, tool_name, input)?;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(
            row.id.clone(),
            PendingEntry {
                tx,
                session_id: session_id.to_string(),
                tool_name: tool_name.to_string(),
            },
        );
        Ok(PermissionTicket {
            request_id: row.id,
            rx,
        })
    }

    /// Block until the request is resolved or `timeout` elapses. A timed
    /// out request is marked `expired` and denied for this call only.
    pub async fn wait(&self, ticket: PermissionTicket, timeout: Duration) -> PermissionDecision {
        match tokio::time::timeout(timeout, ticket.rx).await {
            Ok(Ok(decision)) => decision,
            Ok(Err(_)) => PermissionDecision {
                approved: false,
                scope: Scope::Once,
            },
            Err(_) => {
                self.pending.lock().remove(&ticket.request_id);
                if let Err(e) =
                    self.store
                        .resolve_permission_request(&ticket.request_id, "expired", "once")
                {
                    tracing::warn!(error = %e, request_id = %ticket.request_id, "failed to expire permission request");
                }
                PermissionDecision {
                    approved: false,
                    scope: Scope::Once,
                }
            }
        }
    }

    /// Resolve a request from the UI. Persists the decision, applies
    /// `session`/`always` scope memory, and completes the waiter.
    pub fn resolve(&self, request_id: &str, approved: bool, scope: Scope) -> Result<()> {
        let entry = self.pending.lock().remove(request_id);

        let status = if approved { "approved" } else { "denied" };
        let updated = self
            .store
            .resolve_permission_request(request_id, status, scope.as_str())?;

        let Some(entry) = entry else {
            // No live waiter: either an unknown id or a request that
            // already expired. The row update above decides which.
            if updated {
                return Ok(());
            }
            return Err(Error::NotFound(format!(
                "permission request '{request_id}' not found or already resolved"
            )));
        };

        let remembered = if approved { Policy::Allow } else { Policy::Deny };
        match scope {
            Scope::Always => {
                self.store.upsert_tool_policy(&entry.tool_name, remembered)?;
            }
            Scope::Session => {
                self.session_overrides
                    .write()
                    .entry(entry.session_id.clone())
                    .or_default()
                    .insert(entry.tool_name.clone(), remembered);
            }
            Scope::Once => {}
        }

        let _ = entry.tx.send(PermissionDecision { approved, scope });
        Ok(())
    }

    pub fn pending_requests(&self, session_id: &str) -> Result<Vec<PermissionRequestRow>> {
        self.store.pending_permission_requests(session_id)
    }

    /// Drop session-scoped overrides (called when a session is deleted).
    pub fn forget_session(&self, session_id: &str) {
        self.session_overrides.write().remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate_with_session() -> (Arc<PermissionGate>, String, String, String) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let config = Arc::new(Config::default());
        let s = store.create_session(None).unwrap();
        let t = store.create_turn(&s.id, "x").unwrap();
        let p = store.create_step(&t.id, 0).unwrap();
        (
            Arc::new(PermissionGate::new(store, config)),
            s.id,
            t.id,
            p.id,
        )
    }

    #[test]
    fn default_policy_is_ask() {
        let (gate, sid, ..) = gate_with_session();
        assert_eq!(gate.effective_policy(&sid, "write_file"), Policy::Ask);
    }

    #[test]
    fn spawn_subagent_is_exempt() {
        let (gate, sid, ..) = gate_with_session();
        assert_eq!(gate.effective_policy(&sid, "spawn_subagent"), Policy::Allow);
    }

    #[test]
    fn disabled_tool_is_denied() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let config: Config = toml::from_str(
            r#"
            [permissions.tool_enabled]
            http_fetch = false
            "#,
        )
        .unwrap();
        let s = store.create_session(None).unwrap();
        let gate = PermissionGate::new(store, Arc::new(config));
        assert_eq!(gate.effective_policy(&s.id, "http_fetch"), Policy::Deny);
    }

    #[tokio::test]
    async fn approve_once_completes_waiter() {
        let (gate, sid, tid, pid) = gate_with_session();
        let ticket = gate
            .create_request(&sid, &tid, &pid, "write_file", &serde_json::json!({}))
            .unwrap();
        let request_id = ticket.request_id.clone();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait(ticket, Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        gate.resolve(&request_id, true, Scope::Once).unwrap();
        let decision = waiter.await.unwrap();
        assert!(decision.approved);
        assert_eq!(decision.scope, Scope::Once);

        // Once-scoped approval leaves the effective policy unchanged.
        assert_eq!(gate.effective_policy(&sid, "write_file"), Policy::Ask);
    }

    #[tokio::test]
    async fn session_scope_is_remembered_in_memory() {
        let (gate, sid, tid, pid) = gate_with_session();
        let ticket = gate
            .create_request(&sid, &tid, &pid, "write_file", &serde_json::json!({}))
            .unwrap();
        let request_id = ticket.request_id.clone();
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait(ticket, Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.resolve(&request_id, true, Scope::Session).unwrap();
        assert!(waiter.await.unwrap().approved);

        assert_eq!(gate.effective_policy(&sid, "write_file"), Policy::Allow);
        // Other sessions are unaffected.
        assert_eq!(gate.effective_policy("ses_other", "write_file"), Policy::Ask);

        gate.forget_session(&sid);
        assert_eq!(gate.effective_policy(&sid, "write_file"), Policy::Ask);
    }

    #[tokio::test]
    async fn always_scope_persists_to_store() {
        let (gate, sid, tid, pid) = gate_with_session();
        let ticket = gate
            .create_request(&sid, &tid, &pid, "search", &serde_json::json!({}))
            .unwrap();
        let request_id = ticket.request_id.clone();
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait(ticket, Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.resolve(&request_id, false, Scope::Always).unwrap();
        assert!(!waiter.await.unwrap().approved);

        // Denial with always-scope lands in the durable table.
        assert_eq!(gate.effective_policy(&sid, "search"), Policy::Deny);
        assert_eq!(gate.effective_policy("ses_other", "search"), Policy::Deny);
    }

    #[tokio::test]
    async fn wait_timeout_expires_request() {
        let (gate, sid, tid, pid) = gate_with_session();
        let ticket = gate
            .create_request(&sid, &tid, &pid, "write_file", &serde_json::json!({}))
            .unwrap();
        let request_id = ticket.request_id.clone();

        let decision = gate.wait(ticket, Duration::from_millis(30)).await;
        assert!(!decision.approved);

        let row = gate.store.get_permission_request(&request_id).unwrap().unwrap();
        assert_eq!(row.status, "expired");

        // Resolving after expiry reports not-found.
        assert!(gate.resolve(&request_id, true, Scope::Once).is_err());
    }

    #[test]
    fn resolve_unknown_request_is_not_found() {
        let (gate, ..) = gate_with_session();
        assert!(matches!(
            gate.resolve("perm_missing", true, Scope::Once),
            Err(Error::NotFound(_))
        ));
    }
}
