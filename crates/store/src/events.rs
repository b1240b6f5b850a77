//! Event log: globally ordered ids plus a dense per-session sequence.
//!
//! The sequence is allocated inside a `BEGIN IMMEDIATE` transaction so the
//! read-max/insert pair holds the writer lock for its whole duration. In
//! the rare case another writer (e.g. a second process on the same file)
//! slips in between, the `(session_id, seq)` uniqueness constraint fires
//! and the allocation is retried a bounded number of times.

use rusqlite::{params, TransactionBehavior};

use wh_domain::{Error, Result};

use crate::{db_err, EventRow, Store};

const SEQ_INSERT_ATTEMPTS: usize = 3;

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<EventRow> {
    let payload_text: String = row.get(7)?;
    Ok(EventRow {
        id: row.get(0)?,
        session_id: row.get(1)?,
        turn_id: row.get(2)?,
        step_id: row.get(3)?,
        seq: row.get(4)?,
        ts: row.get(5)?,
        kind: row.get(6)?,
        payload: serde_json::from_str(&payload_text).unwrap_or(serde_json::Value::Null),
    })
}

const EVENT_COLS: &str = "id, session_id, turn_id, step_id, seq, ts, type, payload";

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

impl Store {
    /// Append an event, allocating the next per-session `seq`.
    pub fn insert_event(
        &self,
        session_id: &str,
        turn_id: &str,
        step_id: &str,
        kind: &str,
        ts: f64,
        payload: &serde_json::Value,
    ) -> Result<EventRow> {
        let payload_text = payload.to_string();
        let mut last_err = None;
        for _ in 0..SEQ_INSERT_ATTEMPTS {
            let attempt = {
                let mut conn = self.conn.lock();
                let tx = conn
                    .transaction_with_behavior(TransactionBehavior::Immediate)
                    .map_err(db_err)?;
                let result: rusqlite::Result<(i64, i64)> = (|| {
                    let seq: i64 = tx.query_row(
                        "SELECT COALESCE(MAX(seq), 0) + 1 FROM events WHERE session_id = ?1",
                        [session_id],
                        |row| row.get(0),
                    )?;
                    tx.execute(
                        "INSERT INTO events (session_id, turn_id, step_id, seq, ts, type, payload) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                        params![session_id, turn_id, step_id, seq, ts, kind, payload_text],
                    )?;
                    let id = tx.last_insert_rowid();
                    Ok((id, seq))
                })();
                match result {
                    Ok((id, seq)) => {
                        tx.commit().map_err(db_err)?;
                        Ok((id, seq))
                    }
                    Err(e) => Err(e),
                }
            };
            match attempt {
                Ok((id, seq)) => {
                    return Ok(EventRow {
                        id,
                        seq,
                        ts,
                        kind: kind.to_string(),
                        session_id: session_id.to_string(),
                        turn_id: turn_id.to_string(),
                        step_id: step_id.to_string(),
                        payload: payload.clone(),
                    });
                }
                Err(e) if is_unique_violation(&e) => {
                    last_err = Some(e);
                    continue;
                }
                Err(e) => return Err(db_err(e)),
            }
        }
        Err(last_err
            .map(db_err)
            .unwrap_or_else(|| Error::Database("event sequence allocation retries exhausted".into())))
    }

    /// Events across all sessions (or one, when `session_id` is set),
    /// strictly after `since_id`, in global id order.
    pub fn events_since(
        &self,
        session_id: Option<&str>,
        since_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<EventRow>> {
        let since = since_id.unwrap_or(0);
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EVENT_COLS} FROM events \
                 WHERE (?1 IS NULL OR session_id = ?1) AND id > ?2 \
                 ORDER BY id ASC LIMIT ?3"
            ))?;
            let rows = stmt
                .query_map(params![session_id, since, limit as i64], row_to_event)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// One session's events after `since_id` / `since_seq` (both optional,
    /// both exclusive), in global id order.
    pub fn session_events_since(
        &self,
        session_id: &str,
        since_id: Option<i64>,
        since_seq: Option<i64>,
        limit: usize,
    ) -> Result<Vec<EventRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EVENT_COLS} FROM events \
                 WHERE session_id = ?1 AND id > ?2 AND seq > ?3 \
                 ORDER BY id ASC LIMIT ?4"
            ))?;
            let rows = stmt
                .query_map(
                    params![
                        session_id,
                        since_id.unwrap_or(0),
                        since_seq.unwrap_or(0),
                        limit as i64
                    ],
                    row_to_event,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Highest global event id (0 when the log is empty).
    pub fn latest_event_id(&self) -> Result<i64> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COALESCE(MAX(id), 0) FROM events", [], |row| {
                row.get(0)
            })
        })
    }

}
