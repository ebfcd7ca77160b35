// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Bounded, per-key nonce cache enforcing the sliding replay window (§4.1,
//! §8 property 3 / E4). A nonce already seen for a given `key_id` within
//! the window is rejected; the window is a sliding 5 minutes measured from
//! first sight, and the cache is bounded per key so a misbehaving caller
//! cannot grow it unboundedly.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;

const DEFAULT_CAPACITY: usize = 8192;

pub struct NonceCache {
    window: Duration,
    per_key: Mutex<HashMap<String, LruCache<String, DateTime<Utc>>>>,
}

impl NonceCache {
    pub fn new(window_seconds: i64) -> Self {
        NonceCache {
            window: Duration::seconds(window_seconds),
            per_key: Mutex::new(HashMap::new()),
        }
    }

    /// `check_and_record` returns `true` if the nonce is fresh (and is now
    /// recorded), `false` if it was already seen for this `key_id` within
    /// the replay window.
    pub fn check_and_record(&self, key_id: &str, nonce: &str, now: DateTime<Utc>) -> bool {
        let mut guard = self.per_key.lock().unwrap();
        let cache = guard
            .entry(key_id.to_string())
            .or_insert_with(|| LruCache::new(NonZeroUsize::new(DEFAULT_CAPACITY).unwrap()));

        if let Some(seen_at) = cache.get(nonce) {
            if now - *seen_at <= self.window {
                return false;
            }
        }
        cache.put(nonce.to_string(), now);
        true
    }
}

impl Default for NonceCache {
    fn default() -> Self {
        // 5-minute sliding replay window (§9, resolved open question).
        Self::new(300)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_nonce_is_accepted() {
        let cache = NonceCache::default();
        assert!(cache.check_and_record("k1", "n1", Utc::now()));
    }

    #[test]
    fn repeated_nonce_within_window_is_rejected() {
        let cache = NonceCache::default();
        let now = Utc::now();
        assert!(cache.check_and_record("k1", "n1", now));
        assert!(!cache.check_and_record("k1", "n1", now + Duration::seconds(10)));
    }

    #[test]
    fn same_nonce_distinct_keys_both_accepted() {
        let cache = NonceCache::default();
        let now = Utc::now();
        assert!(cache.check_and_record("k1", "n1", now));
        assert!(cache.check_and_record("k2", "n1", now));
    }

    #[test]
    fn nonce_accepted_again_after_window_elapses() {
        let cache = NonceCache::default();
        let now = Utc::now();
        assert!(cache.check_and_record("k1", "n1", now));
        assert!(cache.check_and_record("k1", "n1", now + Duration::seconds(301)));
    }
}
