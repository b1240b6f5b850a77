//! SQLite persistence for the wheelhouse orchestrator.
//!
//! A single [`Store`] owns one connection behind a mutex. All writes are
//! durable before the call returns (WAL journal, synchronous default) and
//! reads within the same process observe prior writes.
//!
//! The per-session event sequence is allocated inside an immediate
//! transaction so concurrent publishers — even from another process holding
//! the same database file — serialize on the writer lock; see
//! [`Store::insert_event`].

mod context;
mod events;
mod files;
mod history;
mod permissions;
mod policy;
mod rows;
mod sessions;
mod terminal;
mod turns;

pub use rows::*;

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::Connection;

use wh_domain::{Error, Result};

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database at `db_path`, creating parent
    /// directories and the schema as needed.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path).map_err(db_err)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init()?;
        Ok(store)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(())
    }

    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let mut conn = self.conn.lock();
        f(&mut conn).map_err(db_err)
    }
}

pub(crate) fn db_err(e: rusqlite::Error) -> Error {
    Error::Database(e.to_string())
}

/// Short prefixed id, e.g. `ses_9f2c41d0a3b7`.
pub fn new_id(prefix: &str) -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &hex[..12])
}

pub(crate) fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Seconds since epoch, as carried in event envelopes.
pub fn now_ts() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

pub(crate) fn sha256_hex(content: &str) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(content.as_bytes()))
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    id             TEXT PRIMARY KEY,
    title          TEXT NOT NULL DEFAULT 'New Chat',
    model_override TEXT,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    id         TEXT PRIMARY KEY,
    session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    role       TEXT NOT NULL,
    content    TEXT NOT NULL,
    ts         TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id, ts);

CREATE TABLE IF NOT EXISTS turns (
    id         TEXT PRIMARY KEY,
    session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    user_text  TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_turns_session ON turns(session_id, created_at);

CREATE TABLE IF NOT EXISTS steps (
    id          TEXT PRIMARY KEY,
    turn_id     TEXT NOT NULL REFERENCES turns(id) ON DELETE CASCADE,
    idx         INTEGER NOT NULL,
    status      TEXT NOT NULL DEFAULT 'running',
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    UNIQUE (turn_id, idx)
);

CREATE TABLE IF NOT EXISTS events (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    turn_id    TEXT NOT NULL,
    step_id    TEXT NOT NULL,
    seq        INTEGER NOT NULL,
    ts         REAL NOT NULL,
    type       TEXT NOT NULL,
    payload    TEXT NOT NULL DEFAULT '{}',
    UNIQUE (session_id, seq)
);
CREATE INDEX IF NOT EXISTS idx_events_session_seq ON events(session_id, seq);

CREATE TABLE IF NOT EXISTS file_changes (
    id         TEXT PRIMARY KEY,
    session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    turn_id    TEXT NOT NULL,
    step_id    TEXT NOT NULL,
    path       TEXT NOT NULL,
    diff       TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_file_changes_session ON file_changes(session_id, created_at);

CREATE TABLE IF NOT EXISTS file_versions (
    id         TEXT PRIMARY KEY,
    session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    path       TEXT NOT NULL,
    idx        INTEGER NOT NULL,
    sha256     TEXT NOT NULL,
    content    TEXT NOT NULL,
    note       TEXT NOT NULL DEFAULT '',
    turn_id    TEXT,
    step_id    TEXT,
    created_at TEXT NOT NULL,
    UNIQUE (session_id, path, idx)
);

CREATE TABLE IF NOT EXISTS terminal_chunks (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id   TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    turn_id      TEXT NOT NULL,
    step_id      TEXT NOT NULL,
    tool_call_id TEXT NOT NULL,
    stream       TEXT NOT NULL,
    text         TEXT NOT NULL,
    ts           TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_terminal_session ON terminal_chunks(session_id, id);

CREATE TABLE IF NOT EXISTS permission_requests (
    id          TEXT PRIMARY KEY,
    session_id  TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    turn_id     TEXT NOT NULL,
    step_id     TEXT NOT NULL,
    tool_name   TEXT NOT NULL,
    input       TEXT NOT NULL DEFAULT '{}',
    status      TEXT NOT NULL DEFAULT 'pending',
    scope       TEXT NOT NULL DEFAULT 'once',
    created_at  TEXT NOT NULL,
    resolved_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_permissions_session ON permission_requests(session_id, status);

CREATE TABLE IF NOT EXISTS context_items (
    id             TEXT PRIMARY KEY,
    session_id     TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    kind           TEXT NOT NULL,
    title          TEXT NOT NULL,
    content_ref    TEXT NOT NULL,
    pinned         INTEGER NOT NULL DEFAULT 0,
    summary        TEXT,
    summary_sha256 TEXT,
    created_at     TEXT NOT NULL,
    UNIQUE (session_id, kind, content_ref)
);

CREATE TABLE IF NOT EXISTS tool_policies (
    tool_name TEXT PRIMARY KEY,
    policy    TEXT NOT NULL
);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_initializes() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.list_sessions().unwrap().is_empty());
    }

    #[test]
    fn open_creates_parent_dirs() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested/wheelhouse.db");
        let store = Store::open(&path).unwrap();
        store.create_session(None).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn new_id_has_prefix_and_length() {
        let id = new_id("ses");
        assert!(id.starts_with("ses_"));
        assert_eq!(id.len(), 4 + 12);
    }

    #[test]
    fn delete_session_cascades() {
        let store = Store::open_in_memory().unwrap();
        let session = store.create_session(None).unwrap();
        let turn = store.create_turn(&session.id, "hi").unwrap();
        let step = store.create_step(&turn.id, 0).unwrap();
        store
            .insert_event(
                &session.id,
                &turn.id,
                &step.id,
                "message_delta",
                now_ts(),
                &serde_json::json!({"role": "user"}),
            )
            .unwrap();
        store.add_message(&session.id, "user", "hi").unwrap();

        assert!(store.delete_session(&session.id).unwrap());
        assert!(store.get_session(&session.id).unwrap().is_none());
        assert!(store
            .session_events_since(&session.id, None, None, 100)
            .unwrap()
            .is_empty());
        assert!(store.get_messages(&session.id).unwrap().is_empty());
        assert!(store.list_turns(&session.id).unwrap().is_empty());
    }
}
