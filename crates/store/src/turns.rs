use rusqlite::{params, OptionalExtension};

use wh_domain::Result;

use crate::{new_id, now_iso, StepRow, Store, TurnRow};

fn row_to_step(row: &rusqlite::Row<'_>) -> rusqlite::Result<StepRow> {
    Ok(StepRow {
        id: row.get(0)?,
        turn_id: row.get(1)?,
        idx: row.get(2)?,
        status: row.get(3)?,
        started_at: row.get(4)?,
        finished_at: row.get(5)?,
    })
}

impl Store {
    pub fn create_turn(&self, session_id: &str, user_text: &str) -> Result<TurnRow> {
        let id = new_id("turn");
        let now = now_iso();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO turns (id, session_id, user_text, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![id, session_id, user_text, now],
            )
        })?;
        Ok(TurnRow {
            id,
            session_id: session_id.to_string(),
            user_text: user_text.to_string(),
            created_at: now,
        })
    }

    pub fn get_turn(&self, turn_id: &str) -> Result<Option<TurnRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, session_id, user_text, created_at FROM turns WHERE id = ?1",
                [turn_id],
                |row| {
                    Ok(TurnRow {
                        id: row.get(0)?,
                        session_id: row.get(1)?,
                        user_text: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn list_turns(&self, session_id: &str) -> Result<Vec<TurnRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, user_text, created_at FROM turns \
                 WHERE session_id = ?1 ORDER BY created_at ASC, id ASC",
            )?;
            let rows = stmt
                .query_map([session_id], |row| {
                    Ok(TurnRow {
                        id: row.get(0)?,
                        session_id: row.get(1)?,
                        user_text: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Create a step in `running` status. Step indices within a turn are
    /// unique and assigned by the runner in increasing order.
    pub fn create_step(&self, turn_id: &str, idx: i64) -> Result<StepRow> {
        let id = new_id("step");
        let now = now_iso();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO steps (id, turn_id, idx, status, started_at) \
                 VALUES (?1, ?2, ?3, 'running', ?4)",
                params![id, turn_id, idx, now],
            )
        })?;
        Ok(StepRow {
            id,
            turn_id: turn_id.to_string(),
            idx,
            status: "running".to_string(),
            started_at: now,
            finished_at: None,
        })
    }

    /// Mark a step `completed` or `error` and stamp `finished_at`.
    pub fn finish_step(&self, step_id: &str, status: &str) -> Result<()> {
        let now = now_iso();
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE steps SET status = ?1, finished_at = ?2 WHERE id = ?3",
                params![status, now, step_id],
            )
            .map(|_| ())
        })
    }

    pub fn list_steps(&self, turn_id: &str) -> Result<Vec<StepRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, turn_id, idx, status, started_at, finished_at FROM steps \
                 WHERE turn_id = ?1 ORDER BY idx ASC",
            )?;
            let rows = stmt
                .query_map([turn_id], row_to_step)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::Store;

    #[test]
    fn turn_with_steps() {
        let store = Store::open_in_memory().unwrap();
        let s = store.create_session(None).unwrap();
        let turn = store.create_turn(&s.id, "do the thing").unwrap();

        let step0 = store.create_step(&turn.id, 0).unwrap();
        let step1 = store.create_step(&turn.id, 1).unwrap();
        store.finish_step(&step0.id, "completed").unwrap();
        store.finish_step(&step1.id, "error").unwrap();

        let steps = store.list_steps(&turn.id).unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].idx, 0);
        assert_eq!(steps[0].status, "completed");
        assert!(steps[0].finished_at.is_some());
        assert_eq!(steps[1].status, "error");
    }

    #[test]
    fn duplicate_step_idx_rejected() {
        let store = Store::open_in_memory().unwrap();
        let s = store.create_session(None).unwrap();
        let turn = store.create_turn(&s.id, "x").unwrap();
        store.create_step(&turn.id, 0).unwrap();
        assert!(store.create_step(&turn.id, 0).is_err());
    }

    #[test]
    fn list_turns_in_creation_order() {
        let store = Store::open_in_memory().unwrap();
        let s = store.create_session(None).unwrap();
        let t1 = store.create_turn(&s.id, "one").unwrap();
        let t2 = store.create_turn(&s.id, "two").unwrap();
        let turns = store.list_turns(&s.id).unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].id, t1.id);
        assert_eq!(turns[1].id, t2.id);
    }
}
