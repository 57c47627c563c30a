#![deny(missing_docs)]

//! BLAKE2b-256 hashing primitives shared by the patch-log engine.
//!
//! Two flavors of digest are used throughout the engine:
//!
//! - an unkeyed 32-byte BLAKE2b digest ([`digest`]), used to identify
//!   snapshot bytes ("have"/"want"/"to"/"from" hashes).
//! - a keyed 32-byte BLAKE2b digest ([`keyed_digest`]), used as the running
//!   chain value in a JLAP: each line is hashed with the previous chain value
//!   as the MAC key.

use blake2::{
    digest::{consts::U32, KeyInit, Mac, Update},
    Blake2b, Blake2bMac,
};
use std::io::Read;

/// 32-byte (256-bit) unkeyed BLAKE2b digest type.
pub type Blake2b256 = Blake2b<U32>;

/// 32-byte (256-bit) output of a [`Blake2b256`] digest.
pub type Hash = blake2::digest::Output<Blake2b256>;

/// 32-byte (256-bit) keyed BLAKE2b digest type, used for the JLAP chain.
pub type Blake2bMac256 = Blake2bMac<U32>;

/// Maximum key length accepted by [`keyed_digest`] (BLAKE2b's block size).
pub const MAX_KEY_LEN: usize = 64;

/// Error returned when a key passed to [`keyed_digest`] exceeds [`MAX_KEY_LEN`].
#[derive(Debug, thiserror::Error)]
#[error("MAC key of {len} bytes exceeds the maximum of {MAX_KEY_LEN} bytes")]
pub struct KeyTooLongError {
    len: usize,
}

/// Computes the unkeyed 32-byte BLAKE2b digest of `bytes`.
pub fn digest(bytes: impl AsRef<[u8]>) -> Hash {
    use blake2::Digest;
    let mut hasher = Blake2b256::default();
    hasher.update(bytes.as_ref());
    hasher.finalize()
}

/// Computes the keyed 32-byte BLAKE2b digest of `bytes` using `key` as the
/// MAC key. `key` must be at most [`MAX_KEY_LEN`] bytes (the JLAP chain
/// passes the previous chain value's 64 ASCII hex characters as the key,
/// which is exactly at the limit).
pub fn keyed_digest(bytes: impl AsRef<[u8]>, key: impl AsRef<[u8]>) -> Result<Hash, KeyTooLongError> {
    let key = key.as_ref();
    if key.len() > MAX_KEY_LEN {
        return Err(KeyTooLongError { len: key.len() });
    }
    let mut mac = Blake2bMac256::new_from_slice(key).expect("key length already checked");
    Mac::update(&mut mac, bytes.as_ref());
    Ok(mac.finalize().into_bytes())
}

/// Renders a digest as lowercase hex.
pub fn to_hex(hash: &Hash) -> String {
    hex::encode(hash)
}

/// Wraps a byte source with a streaming unkeyed BLAKE2b hasher so a snapshot
/// can be hashed while it is being read and parsed, avoiding a second pass
/// over its bytes.
pub struct StreamingHasher<R> {
    reader: R,
    hasher: Blake2b256,
}

impl<R> StreamingHasher<R> {
    /// Wraps `reader`, starting from an empty hash state.
    pub fn new(reader: R) -> Self {
        use blake2::Digest;
        Self {
            reader,
            hasher: Blake2b256::default(),
        }
    }

    /// Consumes this hasher and returns the digest of everything read so far.
    pub fn finalize(self) -> Hash {
        use blake2::Digest;
        self.hasher.finalize()
    }
}

impl<R: Read> Read for StreamingHasher<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.reader.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;
    use std::io::Read;

    #[rstest]
    #[case("")]
    #[case("hello")]
    #[case("{\"a\":1}")]
    fn digest_is_deterministic(#[case] input: &str) {
        assert_eq!(digest(input), digest(input));
        assert_eq!(to_hex(&digest(input)).len(), 64);
    }

    #[test]
    fn digest_differs_for_different_inputs() {
        assert_ne!(digest("a"), digest("b"));
    }

    #[test]
    fn keyed_digest_depends_on_key() {
        let a = keyed_digest(b"line", "0".repeat(64)).unwrap();
        let b = keyed_digest(b"line", "1".repeat(64)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn keyed_digest_rejects_long_keys() {
        let key = vec![0u8; MAX_KEY_LEN + 1];
        assert!(keyed_digest(b"line", key).is_err());
    }

    #[test]
    fn streaming_hasher_matches_plain_digest() {
        let data = b"hello streaming world".to_vec();
        let mut hasher = StreamingHasher::new(std::io::Cursor::new(data.clone()));
        let mut buf = Vec::new();
        hasher.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, data);
        assert_eq!(hasher.finalize(), digest(&data));
    }
}
