// src/core/storage/string_store.rs

//! The expiring string keyspace: a single mutex-protected map from key to
//! value with an optional absolute expiry.
//!
//! Expiry is enforced twice: lazily by every reader (an expired key is
//! observable as absent the instant its deadline passes) and eagerly by the
//! background sweeper (see `core::tasks::expiry`), which may leak a key for
//! up to one sweep cycle. Readers never depend on the sweeper.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use wildmatch::WildMatch;

/// A stored value with an optional absolute expiry instant.
#[derive(Debug, Clone)]
struct ValueEntry {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl ValueEntry {
    fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

#[derive(Debug, Default)]
pub struct StringStore {
    map: Mutex<HashMap<Bytes, ValueEntry>>,
}

impl StringStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unconditional insert. A relative `ttl` (millisecond resolution) is
    /// converted to an absolute deadline at call time.
    pub fn set(&self, key: Bytes, value: Bytes, ttl: Option<Duration>) {
        let expires_at = ttl.map(|d| Instant::now() + d);
        self.map.lock().insert(key, ValueEntry { value, expires_at });
    }

    /// Returns the current value, or `None` if the key is absent or expired.
    ///
    /// The lock is held for the lookup only; the expiry comparison runs on a
    /// copied deadline after release.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        let entry = self.map.lock().get(key).cloned()?;
        if entry.is_expired_at(Instant::now()) {
            return None;
        }
        Some(entry.value)
    }

    /// All non-expired keys matching `pattern`. `*` matches everything;
    /// other patterns use glob matching.
    pub fn keys(&self, pattern: &str) -> Vec<Bytes> {
        let matcher = (pattern != "*").then(|| WildMatch::new(pattern));
        let now = Instant::now();
        self.map
            .lock()
            .iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .filter(|(key, _)| match &matcher {
                Some(m) => m.matches(&String::from_utf8_lossy(key)),
                None => true,
            })
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Snapshot-load path: same as `set`, but the expiry is an absolute UNIX
    /// millisecond timestamp. Keys already past their deadline are dropped
    /// instead of inserted. Returns whether the key was stored.
    pub fn load_snapshot(&self, key: Bytes, value: Bytes, expires_at_ms: Option<u64>) -> bool {
        let expires_at = match expires_at_ms {
            Some(deadline_ms) => {
                let now_ms = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis() as u64;
                if deadline_ms <= now_ms {
                    return false;
                }
                Some(Instant::now() + Duration::from_millis(deadline_ms - now_ms))
            }
            None => None,
        };
        self.map.lock().insert(key, ValueEntry { value, expires_at });
        true
    }

    /// One sweep cycle: collect the keys whose deadline has passed, then
    /// delete them in a second locked pass that re-checks expiry, so a key
    /// overwritten between the passes survives.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<Bytes> = self
            .map
            .lock()
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        if expired.is_empty() {
            return 0;
        }

        let mut removed = 0;
        let mut map = self.map.lock();
        for key in expired {
            if map.get(&key).is_some_and(|entry| entry.is_expired_at(now)) {
                map.remove(&key);
                removed += 1;
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.lock().is_empty()
    }
}
