//! A two-tier response cache with conditional revalidation.
//!
//! Fresh entries answer GETs directly. When an entry's TTL runs out it is
//! not discarded: the first miss moves it to the stale tier, where its
//! validators (`ETag`, `Last-Modified`) feed `If-None-Match` /
//! `If-Modified-Since` request headers. A 304 from the origin re-arms the
//! stale entry and moves it back to the fresh tier, so the body bytes never
//! cross the wire twice.
//!
//! The cache holds entries until they are invalidated or displaced; there
//! is no size cap.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{Level, event};

use crate::headers::Headers;
use crate::response::Response;

const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Clone)]
struct CacheEntry {
    response: Response,
    expires: Instant,
    etag: String,
    last_modified: String,
}

#[derive(Default)]
struct Tiers {
    fresh: HashMap<String, CacheEntry>,
    stale: HashMap<String, CacheEntry>,
}

/// In-memory response cache, keyed by URL. All operations lock internally,
/// and an entry is never in both tiers at once.
pub struct Cache {
    default_ttl: Duration,
    tiers: Mutex<Tiers>,
}

impl Default for Cache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl Cache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            default_ttl,
            tiers: Mutex::new(Tiers::default()),
        }
    }

    /// Stores a response in the fresh tier, displacing any prior fresh
    /// entry for the URL. The stale tier is left alone. `ETag` and
    /// `Last-Modified` are captured from the response for later
    /// revalidation.
    pub fn set(&self, url: &str, response: &Response, ttl: Option<Duration>) {
        let entry = CacheEntry {
            response: response.clone(),
            expires: Instant::now() + ttl.unwrap_or(self.default_ttl),
            etag: response.header("ETag").unwrap_or_default().to_string(),
            last_modified: response
                .header("Last-Modified")
                .unwrap_or_default()
                .to_string(),
        };

        let mut tiers = self.tiers.lock().unwrap();
        tiers.fresh.insert(url.to_string(), entry);
    }

    /// A fresh, unexpired response for the URL. An expired fresh entry is
    /// demoted to the stale tier on the way out and `None` is returned; an
    /// entry already in the stale tier stays there untouched.
    pub fn get(&self, url: &str) -> Option<Response> {
        let mut tiers = self.tiers.lock().unwrap();

        let entry = tiers.fresh.get(url)?;
        if Instant::now() < entry.expires {
            return Some(entry.response.clone());
        }

        if let Some(expired) = tiers.fresh.remove(url) {
            event!(Level::DEBUG, url, "cache entry expired, keeping validators");
            tiers.stale.insert(url.to_string(), expired);
        }
        None
    }

    /// Conditional-request headers derived from the stale entry for this
    /// URL: `If-None-Match` from a non-empty ETag, `If-Modified-Since` from
    /// a non-empty `Last-Modified`. Empty when neither is available.
    pub fn get_validation_headers(&self, url: &str) -> Headers {
        let tiers = self.tiers.lock().unwrap();

        let mut headers = Headers::new();
        if let Some(entry) = tiers.stale.get(url) {
            if !entry.etag.is_empty() {
                headers.insert("If-None-Match", entry.etag.clone());
            }
            if !entry.last_modified.is_empty() {
                headers.insert("If-Modified-Since", entry.last_modified.clone());
            }
        }
        headers
    }

    /// The origin answered 304: re-arm the stale entry with the default TTL
    /// and promote it back to the fresh tier.
    pub fn handle_not_modified(&self, url: &str) {
        let mut tiers = self.tiers.lock().unwrap();

        if let Some(mut entry) = tiers.stale.remove(url) {
            event!(Level::DEBUG, url, "revalidated, re-arming cached response");
            entry.expires = Instant::now() + self.default_ttl;
            tiers.fresh.insert(url.to_string(), entry);
        }
    }

    /// Drops the URL from both tiers.
    pub fn invalidate(&self, url: &str) {
        let mut tiers = self.tiers.lock().unwrap();
        tiers.fresh.remove(url);
        tiers.stale.remove(url);
    }

    pub fn clear(&self) {
        let mut tiers = self.tiers.lock().unwrap();
        tiers.fresh.clear();
        tiers.stale.clear();
    }
}
