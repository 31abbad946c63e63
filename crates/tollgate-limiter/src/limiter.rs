//! Registry of per-key token buckets.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use parking_lot::Mutex;
use tollgate_core::{Bandwidth, Clock};
use tracing::trace;

use crate::bucket::{Decision, TokenBucket};

type SharedBucket = Arc<Mutex<TokenBucket>>;

/// Rate limiter holding one bucket per key.
///
/// Buckets are created full on first use. The registry map is sharded, and
/// each bucket has its own lock which is only taken after the shard lock is
/// released, so traffic on one key never blocks another.
#[derive(Debug)]
pub struct RateLimiter {
    bandwidth: Bandwidth,
    buckets: DashMap<String, SharedBucket>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Creates an empty limiter.
    pub fn new(bandwidth: Bandwidth, clock: Arc<dyn Clock>) -> Self {
        Self { bandwidth, buckets: DashMap::new(), clock }
    }

    /// Dimensions applied to every bucket.
    pub fn bandwidth(&self) -> &Bandwidth {
        &self.bandwidth
    }

    /// Consumes one token from the key's bucket.
    pub fn try_consume(&self, key: &str) -> Decision {
        let bucket = self.bucket_for(key);
        let mut guard = bucket.lock();
        // Read the clock under the bucket lock so refills see ordered instants.
        let decision = guard.try_consume(&self.bandwidth, self.clock.now());
        drop(guard);

        trace!(key, ?decision, "rate limit decision");
        decision
    }

    /// Tokens currently available for a key, or `None` if it has no bucket.
    pub fn available(&self, key: &str) -> Option<u64> {
        let bucket = self.buckets.get(key).map(|entry| Arc::clone(entry.value()))?;
        let now = self.clock.now();
        let available = bucket.lock().available_at(&self.bandwidth, now);
        Some(available)
    }

    /// Number of keys with a live bucket.
    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }

    /// Evicts buckets idle for at least `idle_for` that are already full.
    ///
    /// A full bucket is indistinguishable from a freshly created one, so
    /// eviction never changes a later decision. Buckets currently held by a
    /// consumer are skipped. Returns the number of evicted buckets.
    pub fn evict_idle(&self, idle_for: Duration) -> usize {
        let now = self.clock.now();
        let mut evicted = 0;

        self.buckets.retain(|_, bucket| {
            if Arc::strong_count(bucket) > 1 {
                return true;
            }
            let keep = !self.is_evictable(&bucket.lock(), idle_for, now);
            if !keep {
                evicted += 1;
            }
            keep
        });

        evicted
    }

    fn is_evictable(&self, bucket: &TokenBucket, idle_for: Duration, now: Instant) -> bool {
        bucket.idle_for(now) >= idle_for
            && bucket.available_at(&self.bandwidth, now) >= self.bandwidth.capacity()
    }

    fn bucket_for(&self, key: &str) -> SharedBucket {
        if let Some(existing) = self.buckets.get(key) {
            return Arc::clone(existing.value());
        }

        let entry = self.buckets.entry(key.to_string()).or_insert_with(|| {
            Arc::new(Mutex::new(TokenBucket::full(&self.bandwidth, self.clock.now())))
        });
        Arc::clone(entry.value())
    }
}
