//! Fixed-window request rate limiter.
//!
//! One bucket per key (usually caller IP plus operation). The first request
//! in a window opens it; once `max_requests` have been admitted the rest are
//! rejected until the window closes. Expired buckets are reset lazily on the
//! next touch and removed by [`RateLimiter::sweep`].

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Default window: 10 seconds.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy)]
struct Bucket {
    count: u32,
    reset_at: Instant,
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed { .. })
    }
}

/// Concurrency-safe fixed-window counter map.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: DashMap<String, Bucket>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
        }
    }

    /// Count one request against `key`.
    pub fn check(&self, key: &str, max_requests: u32, window: Duration) -> RateLimitDecision {
        self.check_at(key, max_requests, window, Instant::now())
    }

    /// Count one request against `key` as of `now`.
    pub fn check_at(
        &self,
        key: &str,
        max_requests: u32,
        window: Duration,
        now: Instant,
    ) -> RateLimitDecision {
        // The entry guard holds the shard lock, so read-and-increment is atomic.
        let mut bucket = self.buckets.entry(key.to_string()).or_insert(Bucket {
            count: 0,
            reset_at: now + window,
        });

        if now > bucket.reset_at {
            bucket.count = 0;
            bucket.reset_at = now + window;
        }

        if bucket.count >= max_requests {
            return RateLimitDecision::Limited {
                retry_after: bucket.reset_at.saturating_duration_since(now),
            };
        }

        bucket.count += 1;
        RateLimitDecision::Allowed {
            remaining: max_requests - bucket.count,
        }
    }

    /// Remove buckets whose window has closed. Returns the number removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|_, b| now <= b.reset_at);
        before.saturating_sub(self.buckets.len())
    }

    /// Number of live buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Forget every bucket.
    pub fn clear(&self) {
        self.buckets.clear();
    }
}
