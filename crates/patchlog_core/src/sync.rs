//! Incremental JLAP sync client (C8).
//!
//! Grounded in `app/sync_jlap.py`'s `line_offsets()` / Range-GET loop (the
//! byte offset of the last JSON line before the summary is the resume
//! point) and in `rattler_repodata_gateway`'s atomic-rename-on-write and
//! `utils::flock::LockedFile` per-path locking conventions.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};

use fs_err as fs;
use reqwest::StatusCode;
use tokio::sync::Mutex as AsyncMutex;
use tracing::instrument;
use url::Url;

use crate::codec::JlapReader;
use crate::error::SyncError;
use crate::http_cache::HttpCache;

/// The metadata record every JLAP ends with, surfaced so a caller (e.g. an
/// HTTP proxy in front of this client) can forward origin headers such as
/// `Last-Modified` without re-parsing the file itself.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct JlapMetadata {
    /// The URL this JLAP was published for.
    pub url: String,
    /// Hash of the latest snapshot the patch chain brings a client to.
    pub latest: Option<String>,
    /// Opaque origin headers passed through by the publisher, if any.
    pub headers: Option<serde_json::Value>,
}

/// Outcome of one [`JlapSyncClient::sync`] call.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// Whether the local file's contents changed.
    pub changed: bool,
    /// Whether the result was served from the HTTP cache rather than a live
    /// request (implies `changed == false`).
    pub from_cache: bool,
    /// The local file's trailing metadata record, if it parses as one (a
    /// JLAP that is empty past its IV line has none).
    pub metadata: Option<JlapMetadata>,
}

/// Reads and parses the last JSON line of a local JLAP as its metadata
/// record. Returns `None` rather than erroring if the file has no JSON
/// lines yet, or if the last line isn't shaped like a metadata record.
fn read_metadata(local_path: &Path) -> Result<Option<JlapMetadata>, SyncError> {
    let file = fs::File::open(local_path)?;
    let mut reader = JlapReader::new(std::io::BufReader::new(file))?;
    let lines = reader.read_all_raw()?;
    Ok(lines
        .last()
        .and_then(|line| serde_json::from_slice(&line.bytes).ok()))
}

/// Pulls a remote JLAP down to a local file, using Range requests to avoid
/// re-transferring bytes already on disk.
pub struct JlapSyncClient {
    client: reqwest::Client,
    cache: HttpCache,
}

impl JlapSyncClient {
    /// Builds a client with the given underlying HTTP client and default
    /// cache freshness window.
    pub fn new(client: reqwest::Client, cache_ttl_seconds: u64) -> Self {
        Self {
            client,
            cache: HttpCache::new(std::time::Duration::from_secs(cache_ttl_seconds)),
        }
    }

    /// Synchronizes `local_path` with `url`, appending only the bytes
    /// needed, or falling back to a full re-download when the local file is
    /// absent, corrupt, or the server declines the Range request.
    #[instrument(skip(self), fields(url = %url, local_path = %local_path.display()))]
    pub async fn sync(&self, url: &Url, local_path: &Path) -> Result<SyncOutcome, SyncError> {
        let _guard = path_lock(local_path).lock_owned().await;
        let (changed, from_cache) = self.sync_locked(url, local_path).await?;
        let metadata = read_metadata(local_path)?;
        Ok(SyncOutcome {
            changed,
            from_cache,
            metadata,
        })
    }

    async fn sync_locked(&self, url: &Url, local_path: &Path) -> Result<(bool, bool), SyncError> {
        if !local_path.exists() {
            tracing::debug!("no local file, fetching in full");
            self.full_get(url, local_path).await?;
            return Ok((true, false));
        }

        let Some(resume) = resume_point(local_path)? else {
            // Fewer than two lines locally; there is nothing sensible to
            // resume from, so re-fetch in full.
            self.full_get(url, local_path).await?;
            return Ok((true, false));
        };

        let range = format!("bytes={}-", resume.offset);
        let response = self
            .cache
            .get(&self.client, url, Some(&range), None)
            .await?;

        if response.from_cache {
            tracing::debug!("served from HTTP cache, skipping verification");
            return Ok((false, true));
        }

        match response.status {
            StatusCode::NOT_MODIFIED => Ok((false, false)),
            StatusCode::PARTIAL_CONTENT => {
                match self
                    .apply_partial(local_path, &resume, &response.body)
                    .await
                {
                    Ok(()) => Ok((true, false)),
                    Err(SyncError::Jlap(_)) => {
                        // The server's suffix did not chain onto ours (the
                        // remote log was likely rewritten/trimmed between
                        // our last sync and now). Discard and refetch whole.
                        tracing::warn!("partial response failed to verify, falling back to full GET");
                        self.full_get(url, local_path).await?;
                        Ok((true, false))
                    }
                    Err(e) => Err(e),
                }
            }
            StatusCode::OK => {
                self.write_atomically(local_path, &response.body)?;
                Ok((true, false))
            }
            other => Err(SyncError::UnexpectedStatus(other)),
        }
    }

    async fn full_get(&self, url: &Url, local_path: &Path) -> Result<(), SyncError> {
        let response = self.cache.get(&self.client, url, None, None).await?;
        if !response.from_cache && response.status != StatusCode::OK {
            return Err(SyncError::UnexpectedStatus(response.status));
        }
        self.write_atomically(local_path, &response.body)?;
        // A freshly written file must itself be a fully-verifying JLAP. If it
        // isn't, don't leave a corrupt file behind for the next sync to trip
        // over: delete it so the caller starts clean next time.
        if let Err(e) = self.verify_on_disk(local_path) {
            let _ = fs::remove_file(local_path);
            return Err(e);
        }
        Ok(())
    }

    fn verify_on_disk(&self, local_path: &Path) -> Result<(), SyncError> {
        let file = fs::File::open(local_path)?;
        let mut reader = JlapReader::new(std::io::BufReader::new(file))?;
        reader.read_all_raw()?;
        Ok(())
    }

    async fn apply_partial(
        &self,
        local_path: &Path,
        resume: &ResumePoint,
        body: &[u8],
    ) -> Result<(), SyncError> {
        // Verify the appended suffix chains from our retained prefix before
        // committing anything to disk.
        let mut tail_reader =
            JlapReader::resume_at(std::io::BufReader::new(body), resume.lineid_before.clone(), resume.offset);
        tail_reader.read_all_raw()?;

        let dir = local_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        {
            let mut prefix = fs::File::open(local_path)?;
            std::io::copy(&mut std::io::Read::take(&mut prefix, resume.offset), &mut tmp)?;
            tmp.write_all(body)?;
            tmp.flush()?;
        }
        tmp.persist(local_path)
            .map_err(|e| SyncError::Io(e.error))?;
        Ok(())
    }

    fn write_atomically(&self, local_path: &Path, body: &[u8]) -> Result<(), SyncError> {
        let dir = local_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        {
            tmp.write_all(body)?;
            tmp.flush()?;
        }
        tmp.persist(local_path)
            .map_err(|e| SyncError::Io(e.error))?;
        Ok(())
    }
}

struct ResumePoint {
    /// Absolute byte offset of the last JSON line before the old summary.
    offset: u64,
    /// Chain value the retained prefix had *before* that line.
    lineid_before: String,
}

/// Scans a local JLAP and returns the byte offset and chain-key needed to
/// resume a Range-GET from its last JSON line (the line the server is most
/// likely to re-send first, since new patches are appended after it).
///
/// Returns `None` if the file has fewer than two lines (IV + at least one
/// JSON line), in which case resuming is not worthwhile.
fn resume_point(local_path: &Path) -> Result<Option<ResumePoint>, SyncError> {
    let file = fs::File::open(local_path)?;
    let mut reader = JlapReader::new(std::io::BufReader::new(file))?;
    let lines = reader.read_all_raw()?;
    let Some(last) = lines.last() else {
        return Ok(None);
    };
    Ok(Some(ResumePoint {
        offset: last.offset,
        lineid_before: last.lineid_before.clone(),
    }))
}

static LOCKS: OnceLock<StdMutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>> = OnceLock::new();

/// Returns the process-wide lock guarding concurrent syncs of `path`,
/// mirroring the single-writer-per-path discipline `LockedFile` enforces at
/// the OS level, but scoped to this process (no other writer is expected to
/// touch the same cache directory out-of-process).
fn path_lock(path: &Path) -> Arc<AsyncMutex<()>> {
    let registry = LOCKS.get_or_init(|| StdMutex::new(HashMap::new()));
    let mut registry = registry.lock().unwrap();
    registry
        .entry(path.to_path_buf())
        .or_insert_with(|| Arc::new(AsyncMutex::new(())))
        .clone()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::JlapWriter;
    use serde_json::json;
    use tempfile::TempDir;

    fn build_jlap_file(dir: &TempDir, name: &str, n: usize) -> PathBuf {
        let path = dir.path().join(name);
        let mut buf = Vec::new();
        let mut writer = JlapWriter::new(&mut buf, None).unwrap();
        for i in 0..n {
            writer.write(&json!({"i": i})).unwrap();
        }
        writer.finish().unwrap();
        fs::write(&path, buf).unwrap();
        path
    }

    #[test]
    fn resume_point_is_the_last_lines_offset() {
        let dir = TempDir::new().unwrap();
        let path = build_jlap_file(&dir, "repodata.jlap", 5);
        let resume = resume_point(&path).unwrap().unwrap();

        let mut reader = JlapReader::new(std::io::BufReader::new(fs::File::open(&path).unwrap())).unwrap();
        let lines = reader.read_all_raw().unwrap();
        assert_eq!(resume.offset, lines.last().unwrap().offset);
        assert_eq!(resume.lineid_before, lines.last().unwrap().lineid_before);
    }

    #[test]
    fn resume_point_is_none_for_empty_jlap() {
        let dir = TempDir::new().unwrap();
        let path = build_jlap_file(&dir, "repodata.jlap", 0);
        assert!(resume_point(&path).unwrap().is_none());
    }

    #[tokio::test]
    async fn apply_partial_extends_the_local_file_and_keeps_it_verifiable() {
        let dir = TempDir::new().unwrap();
        let path = build_jlap_file(&dir, "repodata.jlap", 3);
        let resume = resume_point(&path).unwrap().unwrap();

        // Build the suffix the "server" would send: re-emit the last local
        // line's bytes, then one new line, keyed starting from the same
        // lineid_before so the chain continues seamlessly.
        let mut reader = JlapReader::new(std::io::BufReader::new(fs::File::open(&path).unwrap())).unwrap();
        let lines = reader.read_all_raw().unwrap();
        let last = lines.last().unwrap().clone();

        let mut suffix = Vec::new();
        let mut suffix_writer = JlapWriter::new(&mut suffix, Some(last.lineid_before.clone())).unwrap();
        suffix_writer.write_raw(&last.bytes).unwrap();
        suffix_writer.write(&json!({"i": 99})).unwrap();
        suffix_writer.finish().unwrap();
        // Strip the IV line the writer re-emitted; a Range response starts
        // mid-file, not with a fresh IV.
        let first_newline = suffix.iter().position(|&b| b == b'\n').unwrap();
        let body = &suffix[first_newline + 1..];

        let client = JlapSyncClient::new(reqwest::Client::new(), 30);
        client.apply_partial(&path, &resume, body).await.unwrap();

        let mut verify = JlapReader::new(std::io::BufReader::new(fs::File::open(&path).unwrap())).unwrap();
        let kept = verify.read_all_raw().unwrap();
        assert_eq!(kept.len(), 4);
    }
}
