use rusqlite::{params, OptionalExtension};

use wh_domain::Result;

use crate::{new_id, now_iso, PermissionRequestRow, Store};

fn row_to_request(row: &rusqlite::Row<'_>) -> rusqlite::Result<PermissionRequestRow> {
    let input_text: String = row.get(5)?;
    Ok(PermissionRequestRow {
        id: row.get(0)?,
        session_id: row.get(1)?,
        turn_id: row.get(2)?,
        step_id: row.get(3)?,
        tool_name: row.get(4)?,
        input: serde_json::from_str(&input_text).unwrap_or(serde_json::Value::Null),
        status: row.get(6)?,
        scope: row.get(7)?,
        created_at: row.get(8)?,
        resolved_at: row.get(9)?,
    })
}

const REQUEST_COLS: &str =
    "id, session_id, turn_id, step_id, tool_name, input, status, scope, created_at, resolved_at";

impl Store {
    pub fn create_permission_request(
        &self,
        session_id: &str,
        turn_id: &str,
        step_id: &str,
        tool_name: &str,
        input: &serde_json::Value,
    ) -> Result<PermissionRequestRow> {
        let id = new_id("perm");
        let now = now_iso();
        let input_text = input.to_string();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO permission_requests \
                 (id, session_id, turn_id, step_id, tool_name, input, status, scope, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', 'once', ?7)",
                params![id, session_id, turn_id, step_id, tool_name, input_text, now],
            )
        })?;
        Ok(PermissionRequestRow {
            id,
            session_id: session_id.to_string(),
            turn_id: turn_id.to_string(),
            step_id: step_id.to_string(),
            tool_name: tool_name.to_string(),
            input: input.clone(),
            status: "pending".to_string(),
            scope: "once".to_string(),
            created_at: now,
            resolved_at: None,
        })
    }

    /// Persist the outcome of a request: `approved`, `denied`, or `expired`.
    pub fn resolve_permission_request(
        &self,
        request_id: &str,
        status: &str,
        scope: &str,
    ) -> Result<bool> {
        let now = now_iso();
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE permission_requests SET status = ?1, scope = ?2, resolved_at = ?3 \
                 WHERE id = ?4 AND status = 'pending'",
                params![status, scope, now, request_id],
            )
            .map(|n| n > 0)
        })
    }

    pub fn get_permission_request(&self, request_id: &str) -> Result<Option<PermissionRequestRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {REQUEST_COLS} FROM permission_requests WHERE id = ?1"),
                [request_id],
                row_to_request,
            )
            .optional()
        })
    }

    pub fn pending_permission_requests(
        &self,
        session_id: &str,
    ) -> Result<Vec<PermissionRequestRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {REQUEST_COLS} FROM permission_requests \
                 WHERE session_id = ?1 AND status = 'pending' ORDER BY created_at ASC"
            ))?;
            let rows = stmt
                .query_map([session_id], row_to_request)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::Store;

    fn seed(store: &Store) -> (String, String, String) {
        let s = store.create_session(None).unwrap();
        let t = store.create_turn(&s.id, "x").unwrap();
        let p = store.create_step(&t.id, 1).unwrap();
        (s.id, t.id, p.id)
    }

    #[test]
    fn request_lifecycle() {
        let store = Store::open_in_memory().unwrap();
        let (s, t, p) = seed(&store);
        let req = store
            .create_permission_request(&s, &t, &p, "write_file", &serde_json::json!({"path": "a"}))
            .unwrap();

        let pending = store.pending_permission_requests(&s).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].tool_name, "write_file");

        assert!(store
            .resolve_permission_request(&req.id, "approved", "session")
            .unwrap());
        let resolved = store.get_permission_request(&req.id).unwrap().unwrap();
        assert_eq!(resolved.status, "approved");
        assert_eq!(resolved.scope, "session");
        assert!(resolved.resolved_at.is_some());
        assert!(store.pending_permission_requests(&s).unwrap().is_empty());
    }

    #[test]
    fn resolve_is_single_shot() {
        let store = Store::open_in_memory().unwrap();
        let (s, t, p) = seed(&store);
        let req = store
            .create_permission_request(&s, &t, &p, "search", &serde_json::json!({}))
            .unwrap();
        assert!(store
            .resolve_permission_request(&req.id, "denied", "once")
            .unwrap());
        // A second resolution does nothing: the row already left 'pending'.
        assert!(!store
            .resolve_permission_request(&req.id, "approved", "always")
            .unwrap());
        let row = store.get_permission_request(&req.id).unwrap().unwrap();
        assert_eq!(row.status, "denied");
    }

    #[test]
    fn resolve_unknown_request_is_false() {
        let store = Store::open_in_memory().unwrap();
        assert!(!store
            .resolve_permission_request("perm_missing", "approved", "once")
            .unwrap());
    }
}
