use rusqlite::{params, OptionalExtension};

use wh_domain::Result;

use crate::{new_id, now_iso, SessionRow, Store};

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        id: row.get(0)?,
        title: row.get(1)?,
        model_override: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

const SESSION_COLS: &str = "id, title, model_override, created_at, updated_at";

impl Store {
    pub fn create_session(&self, title: Option<&str>) -> Result<SessionRow> {
        let id = new_id("ses");
        let title = title.unwrap_or("New Chat").to_string();
        let now = now_iso();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (id, title, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
                params![id, title, now, now],
            )
        })?;
        Ok(SessionRow {
            id,
            title,
            model_override: None,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    pub fn get_session(&self, session_id: &str) -> Result<Option<SessionRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {SESSION_COLS} FROM sessions WHERE id = ?1"),
                [session_id],
                row_to_session,
            )
            .optional()
        })
    }

    pub fn list_sessions(&self) -> Result<Vec<SessionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLS} FROM sessions ORDER BY updated_at DESC"
            ))?;
            let rows = stmt
                .query_map([], row_to_session)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn session_exists(&self, session_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1 FROM sessions WHERE id = ?1", [session_id], |_| {
                Ok(())
            })
            .optional()
            .map(|r| r.is_some())
        })
    }

    pub fn update_session_title(&self, session_id: &str, title: &str) -> Result<bool> {
        let now = now_iso();
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE sessions SET title = ?1, updated_at = ?2 WHERE id = ?3",
                params![title, now, session_id],
            )
            .map(|n| n > 0)
        })
    }

    pub fn touch_session(&self, session_id: &str) -> Result<()> {
        let now = now_iso();
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE sessions SET updated_at = ?1 WHERE id = ?2",
                params![now, session_id],
            )
            .map(|_| ())
        })
    }

    pub fn set_model_override(&self, session_id: &str, model: Option<&str>) -> Result<bool> {
        let now = now_iso();
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE sessions SET model_override = ?1, updated_at = ?2 WHERE id = ?3",
                params![model, now, session_id],
            )
            .map(|n| n > 0)
        })
    }

    /// Delete a session and, via foreign keys, every row it owns.
    pub fn delete_session(&self, session_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM sessions WHERE id = ?1", [session_id])
                .map(|n| n > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::Store;

    #[test]
    fn create_and_get() {
        let store = Store::open_in_memory().unwrap();
        let created = store.create_session(Some("planning")).unwrap();
        let fetched = store.get_session(&created.id).unwrap().unwrap();
        assert_eq!(fetched.title, "planning");
        assert!(fetched.model_override.is_none());
    }

    #[test]
    fn rename_updates_title() {
        let store = Store::open_in_memory().unwrap();
        let s = store.create_session(None).unwrap();
        assert!(store.update_session_title(&s.id, "renamed").unwrap());
        assert_eq!(store.get_session(&s.id).unwrap().unwrap().title, "renamed");
    }

    #[test]
    fn rename_missing_session_is_false() {
        let store = Store::open_in_memory().unwrap();
        assert!(!store.update_session_title("ses_missing", "x").unwrap());
    }

    #[test]
    fn model_override_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let s = store.create_session(None).unwrap();
        store.set_model_override(&s.id, Some("gpt-4o-mini")).unwrap();
        assert_eq!(
            store.get_session(&s.id).unwrap().unwrap().model_override,
            Some("gpt-4o-mini".to_string())
        );
        store.set_model_override(&s.id, None).unwrap();
        assert!(store
            .get_session(&s.id)
            .unwrap()
            .unwrap()
            .model_override
            .is_none());
    }

    #[test]
    fn list_orders_by_updated_at() {
        let store = Store::open_in_memory().unwrap();
        let a = store.create_session(Some("a")).unwrap();
        let _b = store.create_session(Some("b")).unwrap();
        // Touching `a` moves it to the front.
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.touch_session(&a.id).unwrap();
        let all = store.list_sessions().unwrap();
        assert_eq!(all[0].id, a.id);
    }
}
