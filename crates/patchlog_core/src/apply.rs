//! Patch applier (C7): given a local snapshot hash `have`, a target hash
//! `want`, and the patch list from a JLAP, select the unique chain bridging
//! `have` to `want` and apply it to the parsed document.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApplyError;

/// A single JLAP patch record: an RFC 6902 operation array plus the
/// pre-/post-image hashes it bridges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patch {
    /// Hash of the document this patch must be applied to.
    pub from: String,
    /// Hash of the document that results from applying this patch.
    pub to: String,
    /// The RFC 6902 operation array itself.
    pub patch: json_patch::Patch,
}

/// Walks `patches` backward from `want` to `have`, returning the unique
/// chain of patches (oldest first) that bridges them, or `None` if no such
/// chain exists.
///
/// The backward walk (rather than a forward search from `have`) avoids
/// exploring dead branches: a JLAP may contain patches whose `from` never
/// matches any client's `have`, but every patch that matters to *this*
/// client is reachable by walking backward from the one hash we know is
/// live — `want`.
pub fn select_chain<'a>(patches: &'a [Patch], have: &str, want: &str) -> Option<Vec<&'a Patch>> {
    let mut chain = Vec::new();
    let mut needed = want.to_string();

    for p in patches.iter().rev() {
        if needed == have {
            break;
        }
        if p.to == needed {
            chain.push(p);
            needed = p.from.clone();
        }
    }

    if needed != have {
        return None;
    }

    chain.reverse(); // discovered newest-first; callers apply oldest-first
    Some(chain)
}

/// Applies `chain` (oldest first, as returned by [`select_chain`]) to
/// `document` in place, verifying the resulting hash at each step.
pub fn apply_chain(document: &mut Value, chain: &[&Patch]) -> Result<(), ApplyError> {
    for (step, patch) in chain.iter().enumerate() {
        json_patch::patch(document, &patch.patch)?;
        let bytes = serde_json::to_vec(document).expect("Value always serializes");
        let hash = patchlog_digest::to_hex(&patchlog_digest::digest(&bytes));
        if hash != patch.to {
            return Err(ApplyError::HashMismatch { step });
        }
    }
    Ok(())
}

/// Convenience wrapper: selects the chain bridging `have` to `want` and
/// applies it to `document`, or returns [`ApplyError::NoChain`] if none
/// exists.
pub fn apply(
    document: &mut Value,
    patches: &[Patch],
    have: &str,
    want: &str,
) -> Result<(), ApplyError> {
    if have == want {
        return Ok(());
    }
    let chain = select_chain(patches, have, want).ok_or_else(|| ApplyError::NoChain {
        have: have.to_string(),
        want: want.to_string(),
    })?;
    apply_chain(document, &chain)
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn patch(from: &str, to: &str, ops: Value) -> Patch {
        Patch {
            from: from.to_string(),
            to: to.to_string(),
            patch: serde_json::from_value(ops).unwrap(),
        }
    }

    #[test]
    fn selects_the_chain_bridging_have_and_want() {
        let patches = vec![
            patch("A", "B", json!([])),
            patch("B", "C", json!([])),
            patch("X", "Y", json!([])),
            patch("C", "D", json!([])),
        ];

        let chain = select_chain(&patches, "B", "D").unwrap();
        let tos: Vec<&str> = chain.iter().map(|p| p.to.as_str()).collect();
        assert_eq!(tos, vec!["C", "D"]);
    }

    #[test]
    fn no_chain_when_have_is_unreachable() {
        let patches = vec![
            patch("A", "B", json!([])),
            patch("B", "C", json!([])),
            patch("X", "Y", json!([])),
            patch("C", "D", json!([])),
        ];

        assert!(select_chain(&patches, "Z", "D").is_none());
    }

    #[test]
    fn have_equals_want_applies_nothing() {
        let mut doc = json!({"n": 1});
        let original = doc.clone();
        apply(&mut doc, &[], "same", "same").unwrap();
        assert_eq!(doc, original);
    }

    #[test]
    fn applies_a_two_step_chain_in_order() {
        let patches = vec![patch(
            "have",
            "mid",
            json!([{"op": "add", "path": "/a", "value": 1}]),
        ), patch(
            "mid",
            "want-placeholder",
            json!([{"op": "add", "path": "/b", "value": 2}]),
        )];

        let mut doc = json!({});
        // Recompute the real target hash so the verification step passes.
        let mut expect_after_first = doc.clone();
        json_patch::patch(&mut expect_after_first, &patches[0].patch).unwrap();
        let hash_after_first =
            patchlog_digest::to_hex(&patchlog_digest::digest(serde_json::to_vec(&expect_after_first).unwrap()));
        let mut patches = patches;
        patches[0].to = hash_after_first.clone();
        patches[1].from = hash_after_first;

        let mut expect_after_second = expect_after_first.clone();
        json_patch::patch(&mut expect_after_second, &patches[1].patch).unwrap();
        let hash_after_second = patchlog_digest::to_hex(&patchlog_digest::digest(
            serde_json::to_vec(&expect_after_second).unwrap(),
        ));
        patches[1].to = hash_after_second.clone();

        apply(&mut doc, &patches, "have", &hash_after_second).unwrap();
        assert_eq!(doc, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn mismatched_hash_is_rejected() {
        let patches = vec![patch(
            "have",
            "claimed-but-wrong",
            json!([{"op": "add", "path": "/a", "value": 1}]),
        )];
        let mut doc = json!({});
        let err = apply(&mut doc, &patches, "have", "claimed-but-wrong").unwrap_err();
        assert!(matches!(err, ApplyError::HashMismatch { step: 0 }));
    }
}
