//! A small HTTP response cache for the sync client (§6, "HTTP layer").
//!
//! Grounded in `sync_jlap.py`'s use of `requests_cache.CachedSession` (cache
//! key includes `Accept`/`Range`, `cache_control=True`, `expire_after=30`)
//! and in the `Expiring<T>` pattern already used for capability probing in
//! `rattler_repodata_gateway::fetch::cache::RepoDataState` (a value plus the
//! instant it was last checked). `cache_control` is the same crate the
//! teacher uses to parse `Cache-Control` response headers.

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    url: String,
    accept: Option<String>,
    range: Option<String>,
}

/// A cached or freshly-fetched HTTP response.
#[derive(Debug, Clone)]
pub struct CachedGet {
    /// The HTTP status code.
    pub status: StatusCode,
    /// Response headers (absent when served from cache).
    pub headers: HeaderMap,
    /// The response body.
    pub body: Bytes,
    /// Whether this response was served from the local cache rather than a
    /// live request. When `true`, callers should treat it like a `304 Not
    /// Modified` and skip re-verification.
    pub from_cache: bool,
}

struct Entry {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    expires_at: Instant,
}

/// TTL-based cache matching GET requests by URL, `Accept`, and `Range`.
pub struct HttpCache {
    entries: Mutex<HashMap<CacheKey, Entry>>,
    default_ttl: Duration,
}

impl HttpCache {
    /// Creates an empty cache with the given default freshness window, used
    /// when a response carries no usable `Cache-Control` header.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
        }
    }

    /// Performs a GET for `url` with the given `Range`/`Accept` headers,
    /// serving a cached response if one is still fresh.
    pub async fn get(
        &self,
        client: &reqwest::Client,
        url: &Url,
        range: Option<&str>,
        accept: Option<&str>,
    ) -> Result<CachedGet, reqwest::Error> {
        let key = CacheKey {
            url: url.to_string(),
            accept: accept.map(str::to_owned),
            range: range.map(str::to_owned),
        };

        if let Some(entry) = self.fresh_entry(&key) {
            return Ok(CachedGet {
                status: entry.status,
                headers: entry.headers,
                body: entry.body,
                from_cache: true,
            });
        }

        let mut request = client.get(url.clone());
        if let Some(range) = range {
            request = request.header(reqwest::header::RANGE, range);
        }
        if let Some(accept) = accept {
            request = request.header(reqwest::header::ACCEPT, accept);
        }

        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        let ttl = headers
            .get(reqwest::header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .and_then(cache_control::CacheControl::from_value)
            .and_then(|cc| cc.max_age)
            .unwrap_or(self.default_ttl);

        if status.is_success() && ttl > Duration::ZERO {
            self.entries.lock().unwrap().insert(
                key,
                Entry {
                    status,
                    headers: headers.clone(),
                    body: body.clone(),
                    expires_at: Instant::now() + ttl,
                },
            );
        }

        Ok(CachedGet {
            status,
            headers,
            body,
            from_cache: false,
        })
    }

    fn fresh_entry(&self, key: &CacheKey) -> Option<Entry> {
        let entries = self.entries.lock().unwrap();
        let entry = entries.get(key)?;
        if entry.expires_at > Instant::now() {
            Some(Entry {
                status: entry.status,
                headers: entry.headers.clone(),
                body: entry.body.clone(),
                expires_at: entry.expires_at,
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn uncached_request_is_not_from_cache() {
        let cache = HttpCache::new(Duration::from_secs(30));
        // Without a running server this would fail at `.send()`; we only
        // exercise the cache-key plumbing here via a clearly invalid URL
        // scheme that reqwest rejects client-side before any I/O.
        let client = reqwest::Client::new();
        let url = Url::parse("http://127.0.0.1:0/unreachable").unwrap();
        let result = cache.get(&client, &url, Some("bytes=0-"), None).await;
        assert!(result.is_err());
    }
}
