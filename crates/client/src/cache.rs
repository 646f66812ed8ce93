//! Read-through response cache keyed by request fingerprints.
//!
//! The cache is owned by the gateway and injected nowhere else - there is
//! no ambient singleton. Entries expire lazily: nothing sweeps the map,
//! a stale entry simply loses to the next fetch for the same key.

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;

use crate::error::Result;

/// One cached response body and the moment it was captured.
#[derive(Debug, Clone)]
struct CacheEntry {
    payload: Value,
    captured_at: Instant,
}

/// Process-wide mapping from request fingerprint to the last fetched
/// payload. Disabled caching degrades to calling the producer every time;
/// any mutation clears the whole map.
#[derive(Debug)]
pub struct RequestCache {
    enabled: bool,
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl RequestCache {
    pub fn new(enabled: bool, ttl: Duration) -> Self {
        Self {
            enabled,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Serves `key` from a live entry when caching is enabled, else runs
    /// `producer` and stores its result under `key`. Producer errors
    /// propagate and are never stored.
    ///
    /// The map lock is only held for lookups and inserts, never across the
    /// `producer` await.
    pub async fn read_through<F, Fut>(&self, key: &str, producer: F) -> Result<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        if self.enabled {
            if let Some(hit) = self.lookup(key) {
                tracing::debug!(target: "mantis::cache", key, "cache hit");
                return Ok(hit);
            }
        }
        let payload = producer().await?;
        if self.enabled {
            tracing::debug!(target: "mantis::cache", key, "cache store");
            self.entries.lock().insert(
                key.to_string(),
                CacheEntry {
                    payload: payload.clone(),
                    captured_at: Instant::now(),
                },
            );
        }
        Ok(payload)
    }

    /// Returns a live (within-TTL) entry for `key`. Expiry is checked here,
    /// lazily at read time.
    fn lookup(&self, key: &str) -> Option<Value> {
        let entries = self.entries.lock();
        let entry = entries.get(key)?;
        if entry.captured_at.elapsed() < self.ttl {
            Some(entry.payload.clone())
        } else {
            None
        }
    }

    /// Drops every entry unconditionally.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of stored entries, live or expired.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builds the cache key for `operation` from `(name, value)` parameter
/// pairs. Pairs are sorted by name before joining, so the call order of
/// optional parameters cannot produce distinct keys for the same logical
/// request.
pub fn fingerprint(operation: &str, params: &[(&str, String)]) -> String {
    let mut pairs: Vec<(&str, &str)> = params.iter().map(|(n, v)| (*n, v.as_str())).collect();
    pairs.sort_unstable();
    let mut key = String::from(operation);
    for (name, value) in pairs {
        key.push('&');
        key.push_str(name);
        key.push('=');
        key.push_str(value);
    }
    key
}
