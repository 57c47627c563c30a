//! Publisher (C6): pulls new revisions of a document from an upstream
//! source, diffs consecutive pairs, persists them, and regenerates the
//! per-URL JLAP.
//!
//! Grounded in `patchfromhg.py`'s `store_patches`/`write_jlap`: diff each
//! newly-seen revision against the previous one, insert the patch, then
//! rewrite the whole JLAP from the patch table (oldest first) followed by a
//! trailing metadata line carrying the URL, the latest hash, and an
//! optional headers passthrough read from a `<file>-headers.json` sidecar.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::instrument;

use patchlog_core::codec::JlapWriter;

use crate::diff::{diff, DiffOutcome};
use crate::error::PublishError;
use crate::store::PatchStore;

/// One revision of a document as seen by a [`RevisionSource`].
#[derive(Debug, Clone)]
pub struct Revision {
    /// Monotonically increasing revision number.
    pub number: i64,
    /// The document itself at this revision.
    pub document: Value,
}

/// Abstracts the upstream history a set of patches is generated from (e.g.
/// a Mercurial repository, in the original system this engine replaces).
#[async_trait]
pub trait RevisionSource: Send + Sync {
    /// Returns every revision of `url` strictly newer than `since`
    /// (`None` meaning "from the beginning"), oldest first.
    async fn revisions(
        &self,
        url: &str,
        since: Option<i64>,
    ) -> Result<Vec<Revision>, PublishError>;

    /// Returns the document at exactly `revision`, or `None` if it is no
    /// longer available (e.g. the upstream history was rewritten). Used to
    /// recover the diff baseline when resuming after a previous publish.
    async fn document_at(&self, url: &str, revision: i64) -> Result<Option<Value>, PublishError>;
}

#[derive(Serialize)]
struct JlapFooter {
    url: String,
    latest: Option<String>,
    headers: Option<Value>,
}

/// Reads the optional `<file>-headers.json` sidecar the original system
/// used to pass response headers through to clients of the regenerated
/// JLAP.
fn read_headers_sidecar(repodata_path: &Path) -> Result<Option<Value>, PublishError> {
    let stem = repodata_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let headers_path = repodata_path.with_file_name(format!("{stem}-headers.json"));
    if !headers_path.exists() {
        return Ok(None);
    }
    let text = fs_err::read_to_string(&headers_path)?;
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|_| PublishError::MalformedHeaders(headers_path))
}

/// Pulls new revisions of `repodata_path` (identified by `url` in the
/// store) from `source`, diffs and persists them, then regenerates the
/// JLAP file at `repodata_path` with a `.jlap` extension.
///
/// Always rewrites the JLAP, even when no new revisions were found, so a
/// first-time call against an already-populated store still produces one.
#[instrument(skip(store, source), fields(url = %url, repodata_path = %repodata_path.display()))]
pub async fn publish(
    store: &PatchStore,
    source: &dyn RevisionSource,
    url: &str,
    repodata_path: &Path,
    patch_steps_limit: usize,
) -> Result<(), PublishError> {
    let since = store.max_revision(url)?;
    let new_revisions = source.revisions(url, since).await?;

    let mut previous = match since {
        Some(revision) => source.document_at(url, revision).await?,
        None => None,
    };

    for revision in new_revisions {
        if let Some(prev_doc) = previous.take() {
            match diff(&prev_doc, &revision.document, patch_steps_limit)? {
                DiffOutcome::Patch(patch) => {
                    store.insert(url, revision.number, &patch)?;
                }
                DiffOutcome::Skipped { reason, count } => {
                    tracing::warn!(
                        revision = revision.number,
                        reason,
                        count,
                        "skipping patch, exceeds step limit"
                    );
                }
            }
        }
        previous = Some(revision.document);
    }

    regenerate_jlap(store, url, repodata_path).await
}

/// Rewrites `repodata_path`'s `.jlap` sibling from the full patch table for
/// `url`, atomically replacing any existing file.
async fn regenerate_jlap(
    store: &PatchStore,
    url: &str,
    repodata_path: &Path,
) -> Result<(), PublishError> {
    let jlap_path = repodata_path.with_extension("jlap");
    assert_ne!(
        jlap_path.extension().and_then(|e| e.to_str()),
        Some("json"),
        "a JLAP must never overwrite its source repodata.json"
    );

    let patches = store.iter(url)?;
    let headers = read_headers_sidecar(repodata_path)?;

    let dir = jlap_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;

    let mut writer = JlapWriter::new(&mut tmp, None)?;
    let mut latest = None;
    for stored in &patches {
        writer.write(&stored.patch)?;
        latest = Some(stored.patch.to.clone());
    }
    if latest.is_none() {
        // No patches recorded yet: `latest` falls back to the hash of the
        // current full snapshot, so a fresh client's `want` is still
        // meaningful (matches `hash_and_load` in patchfromhg.py/json2jlap.py).
        latest = Some(current_snapshot_hash(repodata_path)?);
    }
    writer.write(&JlapFooter {
        url: url.to_string(),
        latest,
        headers,
    })?;
    writer.finish()?;

    tmp.persist(&jlap_path)
        .map_err(|e| PublishError::Io(e.error))?;
    Ok(())
}

/// Hashes the current on-disk bytes of `repodata_path`, for use as `latest`
/// when no patches have been recorded yet.
fn current_snapshot_hash(repodata_path: &Path) -> Result<String, PublishError> {
    let bytes = fs_err::read(repodata_path)?;
    Ok(patchlog_digest::to_hex(&patchlog_digest::digest(&bytes)))
}
