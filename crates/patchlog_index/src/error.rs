//! Error kinds for the publish-side crate (§7): the diff generator, the
//! SQLite patch store, and the publisher that ties them together.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the diff generator (C4).
#[derive(Debug, Error)]
pub enum DiffError {
    /// Either document failed to serialize while computing its digest.
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// Errors from the SQLite-backed patch store (C5).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying SQLite operation failed.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// A stored patch row failed to parse back into a [`patchlog_core::Patch`].
    #[error("stored patch for {url} at revision {revision} is not valid JSON: {source}")]
    MalformedRow {
        /// The URL the corrupt row belongs to.
        url: String,
        /// The revision number of the corrupt row.
        revision: i64,
        /// The underlying parse failure.
        #[source]
        source: serde_json::Error,
    },
}

/// Errors from the publisher (C6).
#[derive(Debug, Error)]
pub enum PublishError {
    /// The patch store reported a failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The diff generator reported a failure.
    #[error(transparent)]
    Diff(#[from] DiffError),

    /// The regenerated JLAP failed to encode.
    #[error(transparent)]
    Jlap(#[from] patchlog_core::JlapError),

    /// Underlying I/O failure reading a revision source or writing the
    /// regenerated JLAP.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Fetching revisions from the upstream source failed.
    #[error("failed to fetch revisions for {0}: {1}")]
    Source(String, String),

    /// The headers sidecar file existed but was not valid JSON.
    #[error("headers file {0} was not valid JSON")]
    MalformedHeaders(PathBuf),
}
