use rusqlite::params;

use wh_domain::Result;

use crate::{now_iso, Store, TerminalChunkRow};

impl Store {
    /// Record a streamed stdout/stderr fragment from a tool execution.
    pub fn add_terminal_chunk(
        &self,
        session_id: &str,
        turn_id: &str,
        step_id: &str,
        tool_call_id: &str,
        stream: &str,
        text: &str,
    ) -> Result<i64> {
        let ts = now_iso();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO terminal_chunks (session_id, turn_id, step_id, tool_call_id, stream, text, ts) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![session_id, turn_id, step_id, tool_call_id, stream, text, ts],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn list_terminal_chunks(&self, session_id: &str) -> Result<Vec<TerminalChunkRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, turn_id, step_id, tool_call_id, stream, text, ts \
                 FROM terminal_chunks WHERE session_id = ?1 ORDER BY id ASC",
            )?;
            let rows = stmt
                .query_map([session_id], |row| {
                    Ok(TerminalChunkRow {
                        id: row.get(0)?,
                        session_id: row.get(1)?,
                        turn_id: row.get(2)?,
                        step_id: row.get(3)?,
                        tool_call_id: row.get(4)?,
                        stream: row.get(5)?,
                        text: row.get(6)?,
                        ts: row.get(7)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::Store;

    #[test]
    fn chunks_keep_insertion_order() {
        let store = Store::open_in_memory().unwrap();
        let s = store.create_session(None).unwrap();
        let t = store.create_turn(&s.id, "x").unwrap();
        let p = store.create_step(&t.id, 1).unwrap();

        let a = store
            .add_terminal_chunk(&s.id, &t.id, &p.id, "tc_1", "stdout", "hello")
            .unwrap();
        let b = store
            .add_terminal_chunk(&s.id, &t.id, &p.id, "tc_1", "stderr", "oops")
            .unwrap();
        assert!(b > a);

        let chunks = store.list_terminal_chunks(&s.id).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].stream, "stdout");
        assert_eq!(chunks[1].text, "oops");
    }
}
