//! JLAP trimmer (C3): rewrite a JLAP keeping only a suffix larger than a
//! low-water mark, re-seeding the chain so the kept suffix is itself a valid
//! JLAP.
//!
//! Grounded in `repodiff/jlaptrim.py`'s `trim`: the only wrinkle over a naive
//! "keep the tail" rewrite is that the first surviving line must become the
//! new IV (dropping the patch it originally carried), because the IV itself
//! never contributes a line to the log.

use std::io::{BufRead, Write};

use crate::codec::{JlapReader, JlapWriter};
use crate::error::JlapError;

/// Outcome of a trim attempt.
#[derive(Debug)]
pub enum TrimOutcome {
    /// The file was already at or below `low` bytes; nothing was written.
    Unchanged,
    /// The file was rewritten to a shorter, still-valid JLAP.
    Trimmed,
}

/// Reads a full JLAP from `reader` and, if its last line starts beyond `low`
/// bytes from the start of the file, writes a trimmed JLAP to `writer` whose
/// IV is re-seeded at the first surviving line and whose summary is
/// unchanged from the original.
///
/// Refuses (returns [`TrimOutcome::Unchanged`]) rather than produce a
/// degenerate JLAP with fewer than two surviving lines.
pub fn trim<R: BufRead, W: Write>(
    reader: R,
    writer: W,
    low: u64,
) -> Result<TrimOutcome, JlapError> {
    let mut jlap_reader = JlapReader::new(reader)?;
    let lines = jlap_reader.read_all_raw()?;
    let summary = jlap_reader.lineid().to_string();

    let Some(last) = lines.last() else {
        return Ok(TrimOutcome::Unchanged);
    };
    let end = last.offset;

    if end <= low {
        return Ok(TrimOutcome::Unchanged);
    }

    let cutoff = end.saturating_sub(low);
    let kept: Vec<_> = lines.into_iter().filter(|l| l.offset >= cutoff).collect();

    if kept.len() < 2 {
        return Ok(TrimOutcome::Unchanged);
    }

    // The new IV is the chain value the first surviving line was hashed
    // with; that line's own content is dropped (the IV does not carry a
    // patch), but the *second* surviving line's hash key is unaffected,
    // because it was always keyed on the first surviving line's post-hash
    // value, which is unchanged by this rewrite.
    let new_iv = kept[0].lineid_before.clone();
    let mut jlap_writer = JlapWriter::new(writer, Some(new_iv))?;
    for line in &kept[1..] {
        jlap_writer.write_raw(&line.bytes)?;
    }
    let written_summary = jlap_writer.lineid().to_string();
    debug_assert_eq!(written_summary, summary, "trim must preserve the original summary");
    jlap_writer.finish()?;

    Ok(TrimOutcome::Trimmed)
}
