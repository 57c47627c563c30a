//! The JLAP line-log codec (C2): reader and writer for the truncateable,
//! hash-chained, line-oriented log format described in the root module docs.

use serde::{de::DeserializeOwned, Serialize};
use std::io::{BufRead, Write};

use crate::error::JlapError;

/// The conventional initial chain value: 64 ASCII '0' characters (hex of 32
/// zero bytes).
fn zero_iv() -> String {
    "0".repeat(64)
}

/// A single JSON-object line read from a JLAP, still in its original bytes so
/// callers can re-emit it verbatim (the trimmer) or parse it on demand (the
/// applier/publisher).
#[derive(Debug, Clone)]
pub struct RawLine {
    /// Absolute byte offset of this line's first byte within the JLAP file
    /// (counting the IV line), usable directly as an HTTP Range offset.
    pub offset: u64,
    /// The line's bytes, without the trailing `\n`.
    pub bytes: Vec<u8>,
    /// The chain value (lowercase hex) after this line, i.e. the MAC key the
    /// *next* line will be hashed with.
    pub lineid: String,
    /// The chain value the line itself was hashed with (the previous line's
    /// `lineid`, or the IV for the first line).
    pub lineid_before: String,
}

/// Reads a JLAP from a byte stream, validating the hash chain as it goes.
pub struct JlapReader<R> {
    reader: R,
    lineid: String,
    offset: u64,
    done: bool,
}

impl<R: BufRead> JlapReader<R> {
    /// Opens a reader positioned at the start of a JLAP. Reads and stores the
    /// IV line (the initial chain value).
    pub fn new(mut reader: R) -> Result<Self, JlapError> {
        let mut buf = Vec::new();
        let n = reader
            .read_until(b'\n', &mut buf)
            .map_err(JlapError::Io)?;
        if n == 0 || buf.last() != Some(&b'\n') {
            return Err(JlapError::MalformedIv);
        }
        buf.pop(); // drop '\n'
        if buf.len() > 64 {
            return Err(JlapError::MalformedIv);
        }
        let lineid =
            String::from_utf8(buf).map_err(|_| JlapError::MalformedIv)?;
        Ok(Self {
            reader,
            offset: n as u64,
            lineid,
            done: false,
        })
    }

    /// Opens a reader over a *suffix* of a JLAP, starting from a chain value
    /// already known to be valid up to `start_offset` (e.g. the
    /// `lineid_before` of a line retained across a Range-GET truncation).
    /// Unlike [`JlapReader::new`], this does not consume an IV line: `reader`
    /// must begin exactly at the first byte of the first surviving line.
    pub fn resume_at(reader: R, lineid: String, start_offset: u64) -> Self {
        Self {
            reader,
            offset: start_offset,
            lineid,
            done: false,
        }
    }

    /// The current chain value (the IV, until at least one line is read).
    pub fn lineid(&self) -> &str {
        &self.lineid
    }

    /// The byte offset of the next line to be read (or, once `read_raw`
    /// returns `None`, the offset of the summary line).
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Reads the next raw line. Returns `Ok(None)` once the summary line has
    /// been reached and validated; further calls return `Ok(None)` again
    /// without re-reading (the reader is not restartable after success or
    /// error, per the JLAP contract).
    pub fn read_raw(&mut self) -> Result<Option<RawLine>, JlapError> {
        if self.done {
            return Ok(None);
        }

        let line_offset = self.offset;
        let mut buf = Vec::new();
        let n = self.reader.read_until(b'\n', &mut buf).map_err(JlapError::Io)?;
        self.offset += n as u64;

        if n == 0 || buf.last() != Some(&b'\n') {
            // Summary line: no trailing newline (or true EOF).
            self.done = true;
            let summary = String::from_utf8(buf).map_err(|_| JlapError::MalformedIv)?;
            if summary != self.lineid {
                return Err(JlapError::Integrity {
                    expected: self.lineid.clone(),
                    got: summary,
                });
            }
            return Ok(None);
        }

        buf.pop(); // drop '\n'
        let lineid_before = self.lineid.clone();
        let new_lineid = patchlog_digest::keyed_digest(&buf, lineid_before.as_bytes())
            .map_err(|_| JlapError::MalformedIv)?;
        let new_lineid = patchlog_digest::to_hex(&new_lineid);
        self.lineid = new_lineid.clone();

        Ok(Some(RawLine {
            offset: line_offset,
            bytes: buf,
            lineid: new_lineid,
            lineid_before,
        }))
    }

    /// Reads and parses the next line as `T`.
    pub fn read<T: DeserializeOwned>(&mut self) -> Result<Option<(T, String)>, JlapError> {
        let Some(raw) = self.read_raw()? else {
            return Ok(None);
        };
        let value = serde_json::from_slice(&raw.bytes)
            .map_err(|source| JlapError::Parse { offset: raw.offset, source })?;
        Ok(Some((value, raw.lineid)))
    }

    /// Reads every remaining line as raw bytes.
    pub fn read_all_raw(&mut self) -> Result<Vec<RawLine>, JlapError> {
        let mut lines = Vec::new();
        while let Some(line) = self.read_raw()? {
            lines.push(line);
        }
        Ok(lines)
    }
}

/// Writes a JLAP to a byte sink, maintaining the running chain value.
pub struct JlapWriter<W> {
    writer: W,
    lineid: String,
}

impl<W: Write> JlapWriter<W> {
    /// Constructs a writer starting from `initial_lineid` (default: 64 ASCII
    /// zeroes), immediately emitting it as the IV line.
    pub fn new(mut writer: W, initial_lineid: Option<String>) -> Result<Self, JlapError> {
        let lineid = initial_lineid.unwrap_or_else(zero_iv);
        writer
            .write_all(lineid.as_bytes())
            .and_then(|()| writer.write_all(b"\n"))
            .map_err(JlapError::Io)?;
        Ok(Self { writer, lineid })
    }

    /// The current chain value.
    pub fn lineid(&self) -> &str {
        &self.lineid
    }

    /// Serializes `obj` to compact, `\n`-free JSON and appends it as the next
    /// line, updating the chain.
    pub fn write<T: Serialize>(&mut self, obj: &T) -> Result<(), JlapError> {
        let line = serde_json::to_vec(obj).map_err(|source| JlapError::Parse { offset: 0, source })?;
        self.write_raw(&line)
    }

    /// Appends `line` (without its own hash having been recomputed from a
    /// parsed value) verbatim. Used by the trimmer and publisher to re-emit
    /// lines without reparsing them, since the chain is defined over the
    /// exact bytes, not over a re-serialization of their meaning.
    pub fn write_raw(&mut self, line: &[u8]) -> Result<(), JlapError> {
        let new_lineid = patchlog_digest::keyed_digest(line, self.lineid.as_bytes())
            .map_err(|_| JlapError::MalformedIv)?;
        self.lineid = patchlog_digest::to_hex(&new_lineid);
        self.writer
            .write_all(line)
            .and_then(|()| self.writer.write_all(b"\n"))
            .map_err(JlapError::Io)
    }

    /// Writes the current chain value as the (non-newline-terminated)
    /// summary line, finishing the log.
    pub fn finish(mut self) -> Result<W, JlapError> {
        self.writer
            .write_all(self.lineid.as_bytes())
            .map_err(JlapError::Io)?;
        Ok(self.writer)
    }
}
