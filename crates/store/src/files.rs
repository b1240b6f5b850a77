//! File mutation history: `file_changes` (audit trail of diffs) and
//! `file_versions` (snapshot line for rollback).
//!
//! Versions are deliberately independent of the change rows so the rollback
//! history survives even if a change record is pruned. `idx = 0` is always
//! the pre-mutation base; neighbors never share a content hash.

use rusqlite::{params, OptionalExtension};

use wh_domain::Result;

use crate::{new_id, now_iso, sha256_hex, FileChangeRow, FileVersionRow, Store};

/// Snapshots above this size are not recorded (the change row still is).
pub const VERSION_MAX_BYTES: usize = 1024 * 1024;

fn row_to_version(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileVersionRow> {
    Ok(FileVersionRow {
        id: row.get(0)?,
        session_id: row.get(1)?,
        path: row.get(2)?,
        idx: row.get(3)?,
        sha256: row.get(4)?,
        content: row.get(5)?,
        note: row.get(6)?,
        turn_id: row.get(7)?,
        step_id: row.get(8)?,
        created_at: row.get(9)?,
    })
}

const VERSION_COLS: &str =
    "id, session_id, path, idx, sha256, content, note, turn_id, step_id, created_at";

impl Store {
    pub fn add_file_change(
        &self,
        session_id: &str,
        turn_id: &str,
        step_id: &str,
        path: &str,
        diff: &str,
    ) -> Result<FileChangeRow> {
        let id = new_id("fc");
        let now = now_iso();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO file_changes (id, session_id, turn_id, step_id, path, diff, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![id, session_id, turn_id, step_id, path, diff, now],
            )
        })?;
        Ok(FileChangeRow {
            id,
            session_id: session_id.to_string(),
            turn_id: turn_id.to_string(),
            step_id: step_id.to_string(),
            path: path.to_string(),
            diff: diff.to_string(),
            created_at: now,
        })
    }

    pub fn list_file_changes(&self, session_id: &str) -> Result<Vec<FileChangeRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, turn_id, step_id, path, diff, created_at \
                 FROM file_changes WHERE session_id = ?1 ORDER BY created_at ASC, id ASC",
            )?;
            let rows = stmt
                .query_map([session_id], |row| {
                    Ok(FileChangeRow {
                        id: row.get(0)?,
                        session_id: row.get(1)?,
                        turn_id: row.get(2)?,
                        step_id: row.get(3)?,
                        path: row.get(4)?,
                        diff: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Insert the `idx = 0` base snapshot iff no version exists yet for
    /// `(session_id, path)`. Returns the new version id, or `None` when the
    /// base already existed.
    pub fn ensure_base_version(
        &self,
        session_id: &str,
        path: &str,
        before_content: &str,
        turn_id: Option<&str>,
        step_id: Option<&str>,
    ) -> Result<Option<String>> {
        if before_content.len() > VERSION_MAX_BYTES {
            return Ok(None);
        }
        let existing: Option<i64> = self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM file_versions WHERE session_id = ?1 AND path = ?2",
                params![session_id, path],
                |row| row.get(0),
            )
            .optional()
        })?;
        if existing.unwrap_or(0) > 0 {
            return Ok(None);
        }
        let id = new_id("fv");
        let now = now_iso();
        let hash = sha256_hex(before_content);
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO file_versions \
                 (id, session_id, path, idx, sha256, content, note, turn_id, step_id, created_at) \
                 VALUES (?1, ?2, ?3, 0, ?4, ?5, 'base', ?6, ?7, ?8)",
                params![id, session_id, path, hash, before_content, turn_id, step_id, now],
            )
        })?;
        Ok(Some(id))
    }

    /// Append the next snapshot iff the content hash differs from the
    /// latest version. Returns the new version id, or `None` when skipped
    /// (identical content, oversized content, or no base exists yet).
    pub fn add_version(
        &self,
        session_id: &str,
        path: &str,
        content: &str,
        note: &str,
        turn_id: Option<&str>,
        step_id: Option<&str>,
    ) -> Result<Option<String>> {
        if content.len() > VERSION_MAX_BYTES {
            return Ok(None);
        }
        let latest = self.latest_version(session_id, path)?;
        let next_idx = match &latest {
            Some(v) => {
                if v.sha256 == sha256_hex(content) {
                    return Ok(None);
                }
                v.idx + 1
            }
            None => 0,
        };
        let id = new_id("fv");
        let now = now_iso();
        let hash = sha256_hex(content);
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO file_versions \
                 (id, session_id, path, idx, sha256, content, note, turn_id, step_id, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![id, session_id, path, next_idx, hash, content, note, turn_id, step_id, now],
            )
        })?;
        Ok(Some(id))
    }

    pub fn latest_version(&self, session_id: &str, path: &str) -> Result<Option<FileVersionRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {VERSION_COLS} FROM file_versions \
                     WHERE session_id = ?1 AND path = ?2 ORDER BY idx DESC LIMIT 1"
                ),
                params![session_id, path],
                row_to_version,
            )
            .optional()
        })
    }

    pub fn list_versions(&self, session_id: &str, path: &str) -> Result<Vec<FileVersionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {VERSION_COLS} FROM file_versions \
                 WHERE session_id = ?1 AND path = ?2 ORDER BY idx ASC"
            ))?;
            let rows = stmt
                .query_map(params![session_id, path], row_to_version)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// All paths with at least one version in the session.
    pub fn versioned_paths(&self, session_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT path FROM file_versions WHERE session_id = ?1 ORDER BY path",
            )?;
            let rows = stmt
                .query_map([session_id], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    pub fn get_version(&self, version_id: &str) -> Result<Option<FileVersionRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {VERSION_COLS} FROM file_versions WHERE id = ?1"),
                [version_id],
                row_to_version,
            )
            .optional()
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::Store;

    fn seed(store: &Store) -> String {
        store.create_session(None).unwrap().id
    }

    #[test]
    fn base_version_inserted_once() {
        let store = Store::open_in_memory().unwrap();
        let s = seed(&store);
        let first = store
            .ensure_base_version(&s, "notes.txt", "", None, None)
            .unwrap();
        assert!(first.is_some());
        let second = store
            .ensure_base_version(&s, "notes.txt", "different", None, None)
            .unwrap();
        assert!(second.is_none(), "base must not be replaced");

        let versions = store.list_versions(&s, "notes.txt").unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].idx, 0);
        assert_eq!(versions[0].content, "");
    }

    #[test]
    fn add_version_dedupes_by_hash() {
        let store = Store::open_in_memory().unwrap();
        let s = seed(&store);
        store
            .ensure_base_version(&s, "a.txt", "v0", None, None)
            .unwrap();
        assert!(store
            .add_version(&s, "a.txt", "v1", "write_file", None, None)
            .unwrap()
            .is_some());
        assert!(
            store
                .add_version(&s, "a.txt", "v1", "write_file", None, None)
                .unwrap()
                .is_none(),
            "identical content must not create a version"
        );
        assert!(store
            .add_version(&s, "a.txt", "v2", "write_file", None, None)
            .unwrap()
            .is_some());

        let versions = store.list_versions(&s, "a.txt").unwrap();
        let idxs: Vec<i64> = versions.iter().map(|v| v.idx).collect();
        assert_eq!(idxs, vec![0, 1, 2]);
        for pair in versions.windows(2) {
            assert_ne!(pair[0].sha256, pair[1].sha256);
        }
    }

    #[test]
    fn oversized_content_skipped() {
        let store = Store::open_in_memory().unwrap();
        let s = seed(&store);
        let huge = "x".repeat(super::VERSION_MAX_BYTES + 1);
        assert!(store
            .add_version(&s, "big.bin", &huge, "write_file", None, None)
            .unwrap()
            .is_none());
    }

    #[test]
    fn versions_scoped_per_session_and_path() {
        let store = Store::open_in_memory().unwrap();
        let s1 = seed(&store);
        let s2 = seed(&store);
        store
            .ensure_base_version(&s1, "f.txt", "one", None, None)
            .unwrap();
        store
            .ensure_base_version(&s2, "f.txt", "two", None, None)
            .unwrap();
        assert_eq!(store.list_versions(&s1, "f.txt").unwrap()[0].content, "one");
        assert_eq!(store.list_versions(&s2, "f.txt").unwrap()[0].content, "two");
        assert_eq!(store.versioned_paths(&s1).unwrap(), vec!["f.txt"]);
    }

    #[test]
    fn file_change_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let s = seed(&store);
        let t = store.create_turn(&s, "x").unwrap();
        let p = store.create_step(&t.id, 1).unwrap();
        store
            .add_file_change(&s, &t.id, &p.id, "notes.txt", "+x\n")
            .unwrap();
        let changes = store.list_file_changes(&s).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "notes.txt");
        assert!(changes[0].diff.contains("+x"));
    }
}
