use rusqlite::params;

use wh_domain::Result;

use crate::{new_id, now_iso, MessageRow, Store};

impl Store {
    /// Append a chat message to the session history.
    pub fn add_message(&self, session_id: &str, role: &str, content: &str) -> Result<MessageRow> {
        let id = new_id("msg");
        let ts = now_iso();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, session_id, role, content, ts) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, session_id, role, content, ts],
            )
        })?;
        Ok(MessageRow {
            id,
            session_id: session_id.to_string(),
            role: role.to_string(),
            content: content.to_string(),
            ts,
        })
    }

    pub fn get_messages(&self, session_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, role, content, ts FROM messages \
                 WHERE session_id = ?1 ORDER BY ts ASC, id ASC",
            )?;
            let rows = stmt
                .query_map([session_id], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        session_id: row.get(1)?,
                        role: row.get(2)?,
                        content: row.get(3)?,
                        ts: row.get(4)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Count of user-role messages; the scheduler uses this to detect the
    /// session's first message for auto-titling.
    pub fn count_user_messages(&self, session_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE session_id = ?1 AND role = 'user'",
                [session_id],
                |row| row.get(0),
            )
        })
    }
}
