//! A [`RevisionSource`] backed by a directory of numbered JSON snapshots.
//!
//! Mirrors `rattler_index`'s `FileSystem` indexing mode (scan a directory,
//! no network) rather than the original system's Mercurial-backed history —
//! the upstream-revision abstraction in [`RevisionSource`] is what lets the
//! publisher stay agnostic to which of the two actually backs it.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs_err as fs;

use crate::error::PublishError;
use crate::publish::{Revision, RevisionSource};

/// Reads revisions named `<revision-number>.json` out of a directory, e.g.
/// `history/0.json`, `history/1.json`, ...
pub struct FileHistorySource {
    history_dir: PathBuf,
}

impl FileHistorySource {
    /// Points a new source at `history_dir`.
    pub fn new(history_dir: impl Into<PathBuf>) -> Self {
        Self {
            history_dir: history_dir.into(),
        }
    }

    fn numbered_files(&self) -> Result<Vec<(i64, PathBuf)>, PublishError> {
        let mut out = Vec::new();
        if !self.history_dir.exists() {
            return Ok(out);
        }
        for entry in fs::read_dir(&self.history_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(number) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<i64>().ok())
            else {
                continue;
            };
            out.push((number, path));
        }
        out.sort_by_key(|(n, _)| *n);
        Ok(out)
    }
}

#[async_trait]
impl RevisionSource for FileHistorySource {
    async fn revisions(
        &self,
        _url: &str,
        since: Option<i64>,
    ) -> Result<Vec<Revision>, PublishError> {
        let mut out = Vec::new();
        for (number, path) in self.numbered_files()? {
            if since.map(|s| number <= s).unwrap_or(false) {
                continue;
            }
            let text = fs::read_to_string(&path)?;
            let document = serde_json::from_str(&text).map_err(|e| {
                PublishError::Source(path.display().to_string(), e.to_string())
            })?;
            out.push(Revision { number, document });
        }
        Ok(out)
    }

    async fn document_at(
        &self,
        _url: &str,
        revision: i64,
    ) -> Result<Option<serde_json::Value>, PublishError> {
        let path: PathBuf = self.history_dir.join(format!("{revision}.json"));
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)?;
        let document = serde_json::from_str(&text)
            .map_err(|e| PublishError::Source(path.display().to_string(), e.to_string()))?;
        Ok(Some(document))
    }
}

/// Returns the history directory conventionally paired with a
/// `repodata.json` path: `<parent>/<stem>-history/`.
pub fn default_history_dir(repodata_path: &Path) -> PathBuf {
    let stem = repodata_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    repodata_path.with_file_name(format!("{stem}-history"))
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn revisions_are_read_in_numeric_order_and_filtered_by_since() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("0.json"), json!({}).to_string()).unwrap();
        fs::write(dir.path().join("1.json"), json!({"a": 1}).to_string()).unwrap();
        fs::write(dir.path().join("10.json"), json!({"a": 2}).to_string()).unwrap();

        let source = FileHistorySource::new(dir.path());
        let revisions = source.revisions("unused", Some(0)).await.unwrap();
        let numbers: Vec<i64> = revisions.iter().map(|r| r.number).collect();
        assert_eq!(numbers, vec![1, 10]);
    }

    #[tokio::test]
    async fn document_at_returns_none_for_a_missing_revision() {
        let dir = TempDir::new().unwrap();
        let source = FileHistorySource::new(dir.path());
        assert!(source.document_at("unused", 5).await.unwrap().is_none());
    }
}
