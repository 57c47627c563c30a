//! The configuration surface enumerated in spec §6.
//!
//! Modeled on `rattler_config::config::repodata_config::RepodataConfig`:
//! plain serde `Deserialize`/`Serialize` with `kebab-case` field names and
//! `Default` values, but without that crate's layered-config `merge` trait —
//! this system has exactly one `Config` object per process, not a
//! user/system/project override stack.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

/// Default value for [`Config::patch_steps_limit`].
pub const DEFAULT_PATCH_STEPS_LIMIT: usize = 8192;
/// Default value for [`Config::jlap_trim_high`].
pub const DEFAULT_JLAP_TRIM_HIGH: u64 = 10 * 1024 * 1024;
/// Default value for [`Config::jlap_trim_low`].
pub const DEFAULT_JLAP_TRIM_LOW: u64 = 3 * 1024 * 1024;
/// Default value for [`Config::chunk_size`].
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;
/// Default value for [`Config::cache_ttl_seconds`].
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 30;

/// Process-wide configuration for the patch-log engine.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Refuse to record a diff whose RFC 6902 operation count exceeds this.
    #[serde(default = "default_patch_steps_limit")]
    pub patch_steps_limit: usize,

    /// Rewrite a JLAP once it exceeds this many bytes.
    #[serde(default = "default_jlap_trim_high")]
    pub jlap_trim_high: u64,

    /// Target size (in bytes) a rewritten JLAP should shrink to.
    #[serde(default = "default_jlap_trim_low")]
    pub jlap_trim_low: u64,

    /// Root directory for the proxy/sync client's cache.
    pub cache_dir: Option<PathBuf>,

    /// Base URL used to resolve JLAP fetches.
    pub mirror_url: Option<Url>,

    /// Streaming read granularity used while hashing/parsing snapshots.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// How long a cached HTTP response is considered fresh absent a
    /// `Cache-Control` header (§6, "HTTP layer").
    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            patch_steps_limit: DEFAULT_PATCH_STEPS_LIMIT,
            jlap_trim_high: DEFAULT_JLAP_TRIM_HIGH,
            jlap_trim_low: DEFAULT_JLAP_TRIM_LOW,
            cache_dir: None,
            mirror_url: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            cache_ttl_seconds: DEFAULT_CACHE_TTL_SECONDS,
        }
    }
}

fn default_patch_steps_limit() -> usize {
    DEFAULT_PATCH_STEPS_LIMIT
}
fn default_jlap_trim_high() -> u64 {
    DEFAULT_JLAP_TRIM_HIGH
}
fn default_jlap_trim_low() -> u64 {
    DEFAULT_JLAP_TRIM_LOW
}
fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_cache_ttl_seconds() -> u64 {
    DEFAULT_CACHE_TTL_SECONDS
}

#[cfg(test)]
mod test {
    use super::Config;

    #[test]
    fn default_matches_spec_defaults() {
        let config = Config::default();
        assert_eq!(config.patch_steps_limit, 8192);
        assert_eq!(config.jlap_trim_high, 10 * 1024 * 1024);
        assert_eq!(config.jlap_trim_low, 3 * 1024 * 1024);
        assert_eq!(config.chunk_size, 16 * 1024);
    }

    #[test]
    fn deserializes_partial_json_with_defaults() {
        let config: Config = serde_json::from_str(r#"{"patch-steps-limit": 512}"#).unwrap();
        assert_eq!(config.patch_steps_limit, 512);
        assert_eq!(config.jlap_trim_low, 3 * 1024 * 1024);
    }
}
