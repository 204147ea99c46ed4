//! Short-lived idempotency cache.
//!
//! Collapses rapid duplicate submissions: requests that produce the same key
//! (operation, caller IP, identity marker, wall-clock second) within the
//! window get the first response back verbatim.

use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use sha2::{Digest, Sha256};

/// Default eviction window: 5 seconds.
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(5);

/// Cache key for one collapsed request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey(String);

impl DedupKey {
    /// Build a key for an explicit second bucket (unix seconds).
    pub fn new(operation: &str, caller_ip: &str, marker: &str, second: i64) -> Self {
        Self(format!("{operation}:{caller_ip}:{marker}:{second}"))
    }

    /// Build a key for the current wall-clock second.
    pub fn current(operation: &str, caller_ip: &str, marker: &str) -> Self {
        Self::new(operation, caller_ip, marker, Utc::now().timestamp())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Stable fingerprint of the identity fields of a request, so secrets
/// (passwords, tokens) never appear in a key verbatim. Parts are
/// NUL-separated before hashing.
pub fn identity_marker(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update([0u8]);
        }
        hasher.update(part.as_bytes());
    }
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

#[derive(Debug, Clone)]
struct Entry<V> {
    stored_at: Instant,
    value: V,
}

/// Concurrency-safe response cache with a fixed eviction window.
#[derive(Debug)]
pub struct DedupCache<V> {
    entries: DashMap<DedupKey, Entry<V>>,
    window: Duration,
}

impl<V: Clone> DedupCache<V> {
    pub fn new(window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            window,
        }
    }

    /// Cached response for `key`, if still inside the window.
    pub fn get(&self, key: &DedupKey) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &DedupKey, now: Instant) -> Option<V> {
        let entry = self.entries.get(key)?;
        if now.saturating_duration_since(entry.stored_at) > self.window {
            return None;
        }
        Some(entry.value.clone())
    }

    /// Store a response. The first stored value for a key wins until it
    /// leaves the window.
    pub fn insert(&self, key: DedupKey, value: V) -> V {
        self.insert_at(key, value, Instant::now())
    }

    pub fn insert_at(&self, key: DedupKey, value: V, now: Instant) -> V {
        let window = self.window;
        let mut entry = self.entries.entry(key).or_insert_with(|| Entry {
            stored_at: now,
            value: value.clone(),
        });
        if now.saturating_duration_since(entry.stored_at) > window {
            *entry = Entry {
                stored_at: now,
                value,
            };
        }
        entry.value.clone()
    }

    /// Evict entries older than the window. Returns the number removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.entries.len();
        let window = self.window;
        self.entries
            .retain(|_, e| now.saturating_duration_since(e.stored_at) <= window);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
