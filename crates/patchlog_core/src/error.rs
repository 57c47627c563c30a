//! Error kinds for the patch-log engine's client-facing crate (§7).

use thiserror::Error;

/// Errors surfaced directly by the codec (C2). The applier and sync client
/// catch these and convert them into recovery actions rather than
/// propagating them as-is.
#[derive(Debug, Error)]
pub enum JlapError {
    /// Underlying I/O failure while reading or writing a JLAP.
    #[error(transparent)]
    Io(std::io::Error),

    /// A JSON line inside a JLAP failed to parse.
    #[error("invalid JSON at byte offset {offset}")]
    Parse {
        /// Byte offset of the offending line within the JLAP.
        offset: u64,
        /// The underlying parse failure.
        #[source]
        source: serde_json::Error,
    },

    /// The trailing summary line did not match the chain value computed from
    /// the preceding lines.
    #[error("JLAP summary mismatch: expected {expected}, got {got}")]
    Integrity {
        /// The chain value computed from the lines actually read.
        expected: String,
        /// The chain value found on disk/wire as the summary line.
        got: String,
    },

    /// The IV line (or a computed chain value) was not a well-formed,
    /// sufficiently short hex string.
    #[error("malformed initial vector or chain value")]
    MalformedIv,
}

/// Errors from the patch applier (C7).
#[derive(Debug, Error)]
pub enum ApplyError {
    /// The codec reported a structural problem with the JLAP.
    #[error(transparent)]
    Jlap(#[from] JlapError),

    /// No chain of patches bridges `have` to `want`.
    #[error("no patch chain bridges {have} to {want}")]
    NoChain {
        /// Hash of the local snapshot.
        have: String,
        /// Target hash from the JLAP's metadata record.
        want: String,
    },

    /// Applying an RFC 6902 patch to the in-memory document failed.
    #[error(transparent)]
    Patch(#[from] json_patch::PatchError),

    /// The document's hash after applying the selected chain did not match
    /// the patch's declared `to` hash.
    #[error("hash after applying patch {step} did not match its declared 'to' hash")]
    HashMismatch {
        /// Index of the patch (within the selected chain) whose result hash
        /// mismatched.
        step: usize,
    },
}

/// Errors from the incremental sync client (C8).
#[derive(Debug, Error)]
pub enum SyncError {
    /// The codec reported a structural problem; the caller should discard
    /// the local file and retry with a full GET.
    #[error(transparent)]
    Jlap(#[from] JlapError),

    /// Transport-level failure performing the GET/Range request.
    #[error(transparent)]
    Network(#[from] reqwest::Error),

    /// The server responded with a status this client does not know how to
    /// handle (anything other than 200, 206, 304).
    #[error("unexpected HTTP status {0}")]
    UnexpectedStatus(reqwest::StatusCode),

    /// Local filesystem failure (read, truncate, append, atomic rename).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A second writer appears to be modifying the same local JLAP
    /// concurrently (detected via the per-path lock).
    #[error("concurrent writer detected for {0}")]
    Concurrency(std::path::PathBuf),
}
