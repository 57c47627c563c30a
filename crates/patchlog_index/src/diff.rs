//! Patch generator (C4): computes the RFC 6902 diff between two revisions
//! of a document, subject to a step-count bound.
//!
//! Grounded in `patchfromhg.py`'s `make_patches` (diff consecutive
//! revisions with `jsonpatch.make_patch`, tag the result with the `from`/
//! `to` BLAKE2b digests of the two documents).

use serde_json::Value;

use crate::error::DiffError;
use patchlog_core::Patch;

/// Outcome of attempting to diff two revisions.
#[derive(Debug)]
pub enum DiffOutcome {
    /// A patch was generated and is within the configured step limit.
    Patch(Patch),
    /// The diff's operation count exceeded `patch_steps_limit`; the caller
    /// should fall back to publishing a full snapshot for this revision
    /// instead of a patch.
    Skipped {
        /// Human-readable reason (always "too many operations" today, but
        /// kept as a string so future skip reasons don't require an enum
        /// migration at every call site).
        reason: &'static str,
        /// The operation count that triggered the skip.
        count: usize,
    },
}

/// Diffs `from_doc` to `to_doc`, tagging the result with their BLAKE2b-256
/// digests. Returns [`DiffOutcome::Skipped`] rather than a [`Patch`] when
/// the diff has more than `patch_steps_limit` operations.
pub fn diff(
    from_doc: &Value,
    to_doc: &Value,
    patch_steps_limit: usize,
) -> Result<DiffOutcome, DiffError> {
    let ops = json_patch::diff(from_doc, to_doc);

    if ops.0.len() > patch_steps_limit {
        return Ok(DiffOutcome::Skipped {
            reason: "too many operations",
            count: ops.0.len(),
        });
    }

    let from_hash = patchlog_digest::to_hex(&patchlog_digest::digest(serde_json::to_vec(
        from_doc,
    )?));
    let to_hash = patchlog_digest::to_hex(&patchlog_digest::digest(serde_json::to_vec(to_doc)?));

    Ok(DiffOutcome::Patch(Patch {
        from: from_hash,
        to: to_hash,
        patch: ops,
    }))
}
