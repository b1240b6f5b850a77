use rusqlite::{params, OptionalExtension};

use wh_domain::Result;

use crate::{new_id, now_iso, ContextItemRow, Store};

fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<ContextItemRow> {
    let pinned: i64 = row.get(5)?;
    Ok(ContextItemRow {
        id: row.get(0)?,
        session_id: row.get(1)?,
        kind: row.get(2)?,
        title: row.get(3)?,
        content_ref: row.get(4)?,
        pinned: pinned != 0,
        summary: row.get(6)?,
        summary_sha256: row.get(7)?,
        created_at: row.get(8)?,
    })
}

const ITEM_COLS: &str =
    "id, session_id, kind, title, content_ref, pinned, summary, summary_sha256, created_at";

impl Store {
    /// Insert or refresh a context item. Repeated captures of the same
    /// `(session_id, kind, content_ref)` update the title in place and
    /// never clear an existing pin.
    pub fn upsert_context_item(
        &self,
        session_id: &str,
        kind: &str,
        title: &str,
        content_ref: &str,
        pinned: bool,
    ) -> Result<ContextItemRow> {
        let id = new_id("ctx");
        let now = now_iso();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO context_items (id, session_id, kind, title, content_ref, pinned, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
                 ON CONFLICT(session_id, kind, content_ref) DO UPDATE SET \
                   title = excluded.title, \
                   pinned = MAX(pinned, excluded.pinned)",
                params![id, session_id, kind, title, content_ref, pinned as i64, now],
            )
        })?;
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {ITEM_COLS} FROM context_items \
                     WHERE session_id = ?1 AND kind = ?2 AND content_ref = ?3"
                ),
                params![session_id, kind, content_ref],
                row_to_item,
            )
        })
    }

    pub fn list_context_items(&self, session_id: &str) -> Result<Vec<ContextItemRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ITEM_COLS} FROM context_items \
                 WHERE session_id = ?1 ORDER BY pinned DESC, created_at ASC"
            ))?;
            let rows = stmt
                .query_map([session_id], row_to_item)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn pinned_context_items(&self, session_id: &str) -> Result<Vec<ContextItemRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ITEM_COLS} FROM context_items \
                 WHERE session_id = ?1 AND pinned = 1 ORDER BY created_at ASC"
            ))?;
            let rows = stmt
                .query_map([session_id], row_to_item)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn get_context_item(&self, item_id: &str) -> Result<Option<ContextItemRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {ITEM_COLS} FROM context_items WHERE id = ?1"),
                [item_id],
                row_to_item,
            )
            .optional()
        })
    }

    pub fn set_context_pinned(&self, item_id: &str, pinned: bool) -> Result<bool> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE context_items SET pinned = ?1 WHERE id = ?2",
                params![pinned as i64, item_id],
            )
            .map(|n| n > 0)
        })
    }

    pub fn set_context_ref(&self, item_id: &str, content_ref: &str) -> Result<bool> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE context_items SET content_ref = ?1 WHERE id = ?2",
                params![content_ref, item_id],
            )
            .map(|n| n > 0)
        })
    }

    /// Cache a pinned item's summary, keyed by the content hash it was
    /// computed from.
    pub fn set_context_summary(
        &self,
        item_id: &str,
        summary: &str,
        summary_sha256: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE context_items SET summary = ?1, summary_sha256 = ?2 WHERE id = ?3",
                params![summary, summary_sha256, item_id],
            )
            .map(|n| n > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::Store;

    #[test]
    fn upsert_by_ref_updates_in_place() {
        let store = Store::open_in_memory().unwrap();
        let s = store.create_session(None).unwrap();
        let a = store
            .upsert_context_item(&s.id, "file", "notes.txt", "notes.txt", false)
            .unwrap();
        let b = store
            .upsert_context_item(&s.id, "file", "notes.txt (updated)", "notes.txt", false)
            .unwrap();
        assert_eq!(a.id, b.id, "same ref must update, not duplicate");
        assert_eq!(b.title, "notes.txt (updated)");
        assert_eq!(store.list_context_items(&s.id).unwrap().len(), 1);
    }

    #[test]
    fn upsert_never_clears_pin() {
        let store = Store::open_in_memory().unwrap();
        let s = store.create_session(None).unwrap();
        let item = store
            .upsert_context_item(&s.id, "web", "https://example.com", "https://example.com", true)
            .unwrap();
        assert!(item.pinned);
        // Re-capture with pinned=false (opportunistic capture path).
        let again = store
            .upsert_context_item(&s.id, "web", "https://example.com", "https://example.com", false)
            .unwrap();
        assert!(again.pinned, "opportunistic recapture must not unpin");
    }

    #[test]
    fn pin_unpin_and_summary_cache() {
        let store = Store::open_in_memory().unwrap();
        let s = store.create_session(None).unwrap();
        let item = store
            .upsert_context_item(&s.id, "doc", "guide", "doc:guide", false)
            .unwrap();

        assert!(store.set_context_pinned(&item.id, true).unwrap());
        assert_eq!(store.pinned_context_items(&s.id).unwrap().len(), 1);

        assert!(store
            .set_context_summary(&item.id, "short form", "abc123")
            .unwrap());
        let got = store.get_context_item(&item.id).unwrap().unwrap();
        assert_eq!(got.summary.as_deref(), Some("short form"));
        assert_eq!(got.summary_sha256.as_deref(), Some("abc123"));

        assert!(store.set_context_pinned(&item.id, false).unwrap());
        assert!(store.pinned_context_items(&s.id).unwrap().is_empty());
    }

    #[test]
    fn set_ref_moves_pointer() {
        let store = Store::open_in_memory().unwrap();
        let s = store.create_session(None).unwrap();
        let item = store
            .upsert_context_item(&s.id, "file", "a.txt", "a.txt", true)
            .unwrap();
        assert!(store.set_context_ref(&item.id, "b.txt").unwrap());
        let got = store.get_context_item(&item.id).unwrap().unwrap();
        assert_eq!(got.content_ref, "b.txt");
    }
}
