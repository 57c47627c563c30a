//! SQLite-backed patch store (C5).
//!
//! Grounded directly in `patchfromhg.py`'s `store_patches`: a single
//! `patches` table in WAL mode, one row per generated patch, keyed by the
//! URL the patch belongs to and an increasing revision number.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StoreError;
use patchlog_core::Patch;

/// A patch together with the revision number it was recorded at.
#[derive(Debug, Clone)]
pub struct StoredPatch {
    /// The revision number this patch was generated for.
    pub revision: i64,
    /// The patch itself.
    pub patch: Patch,
}

/// Durable store of generated patches, one table shared across every
/// indexed URL.
pub struct PatchStore {
    conn: Connection,
}

impl PatchStore {
    /// Opens (creating if needed) a patch store at `path`, enabling WAL mode
    /// and the `patches` table.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Opens an in-memory store, primarily for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "journal_mode", "wal")?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS patches (
                id INTEGER PRIMARY KEY,
                url TEXT NOT NULL,
                revision_to INTEGER,
                patch TEXT NOT NULL,
                timestamp TEXT DEFAULT CURRENT_TIMESTAMP NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS patches_url_revision ON patches (url, revision_to)",
            [],
        )?;
        Ok(Self { conn })
    }

    /// The highest revision number recorded for `url`, ignoring negative
    /// placeholder revisions, or `None` if no real revision has ever been
    /// stored for it.
    pub fn max_revision(&self, url: &str) -> Result<Option<i64>, StoreError> {
        let max: Option<i64> = self
            .conn
            .query_row(
                "SELECT max(revision_to) FROM patches WHERE url = ?1 AND revision_to >= 0",
                params![url],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(max)
    }

    /// Records a new patch for `url` at `revision`.
    pub fn insert(&self, url: &str, revision: i64, patch: &Patch) -> Result<(), StoreError> {
        let json = serde_json::to_string(patch).map_err(|e| StoreError::MalformedRow {
            url: url.to_string(),
            revision,
            source: e,
        })?;
        self.conn.execute(
            "INSERT INTO patches (url, revision_to, patch) VALUES (?1, ?2, ?3)",
            params![url, revision, json],
        )?;
        Ok(())
    }

    /// Every patch stored for `url`, oldest revision first.
    pub fn iter(&self, url: &str) -> Result<Vec<StoredPatch>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT revision_to, patch FROM patches WHERE url = ?1 ORDER BY revision_to ASC",
        )?;
        let rows = stmt.query_map(params![url], |row| {
            let revision: i64 = row.get(0)?;
            let patch: String = row.get(1)?;
            Ok((revision, patch))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (revision, patch_json) = row?;
            let patch: Patch =
                serde_json::from_str(&patch_json).map_err(|source| StoreError::MalformedRow {
                    url: url.to_string(),
                    revision,
                    source,
                })?;
            out.push(StoredPatch { revision, patch });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn patch(from: &str, to: &str) -> Patch {
        Patch {
            from: from.to_string(),
            to: to.to_string(),
            patch: serde_json::from_value(json!([])).unwrap(),
        }
    }

    #[test]
    fn max_revision_is_none_for_an_unknown_url() {
        let store = PatchStore::open_in_memory().unwrap();
        assert_eq!(store.max_revision("https://example/repodata.json").unwrap(), None);
    }

    #[test]
    fn insert_then_iter_returns_patches_in_revision_order() {
        let store = PatchStore::open_in_memory().unwrap();
        let url = "https://example/repodata.json";

        store.insert(url, 2, &patch("B", "C")).unwrap();
        store.insert(url, 1, &patch("A", "B")).unwrap();

        let patches = store.iter(url).unwrap();
        let revisions: Vec<i64> = patches.iter().map(|p| p.revision).collect();
        assert_eq!(revisions, vec![1, 2]);

        assert_eq!(store.max_revision(url).unwrap(), Some(2));
    }

    #[test]
    fn max_revision_ignores_negative_placeholder_rows() {
        let store = PatchStore::open_in_memory().unwrap();
        let url = "https://example/repodata.json";

        store.insert(url, -1, &patch("A", "B")).unwrap();
        assert_eq!(store.max_revision(url).unwrap(), None);

        store.insert(url, 3, &patch("B", "C")).unwrap();
        store.insert(url, -1, &patch("C", "D")).unwrap();
        assert_eq!(store.max_revision(url).unwrap(), Some(3));
    }

    #[test]
    fn patches_are_scoped_per_url() {
        let store = PatchStore::open_in_memory().unwrap();
        store.insert("https://a/repodata.json", 1, &patch("A", "B")).unwrap();
        store.insert("https://b/repodata.json", 1, &patch("X", "Y")).unwrap();

        assert_eq!(store.iter("https://a/repodata.json").unwrap().len(), 1);
        assert_eq!(store.iter("https://b/repodata.json").unwrap().len(), 1);
    }
}
