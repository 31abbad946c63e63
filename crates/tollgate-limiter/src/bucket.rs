//! Interval-refill token bucket.
//!
//! Tokens are added in whole chunks: every completed refill interval adds
//! `refill_tokens`, capped at capacity. The refill timestamp advances by
//! whole intervals only, so partial progress toward the next chunk is
//! never lost by an intermediate consume.

use std::time::{Duration, Instant};

use tollgate_core::Bandwidth;

/// Outcome of a single consume attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// One token was taken.
    Admitted {
        /// Tokens left in the bucket after this request.
        remaining: u64,
    },
    /// The bucket was empty; nothing was taken.
    Denied {
        /// Whole seconds until the next refill, at least 1.
        retry_after_seconds: u64,
    },
}

impl Decision {
    /// Returns true for [`Decision::Admitted`].
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted { .. })
    }
}

/// Token bucket state for a single key.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    tokens: u64,
    last_refill: Instant,
    last_seen: Instant,
}

impl TokenBucket {
    /// Creates a bucket filled to capacity.
    pub fn full(bandwidth: &Bandwidth, now: Instant) -> Self {
        Self { tokens: bandwidth.capacity(), last_refill: now, last_seen: now }
    }

    /// Applies any completed refill intervals, then tries to take one token.
    pub fn try_consume(&mut self, bandwidth: &Bandwidth, now: Instant) -> Decision {
        self.refill(bandwidth, now);
        self.last_seen = self.last_seen.max(now);

        if self.tokens > 0 {
            self.tokens -= 1;
            return Decision::Admitted { remaining: self.tokens };
        }

        let wait = self.time_to_next_refill(bandwidth, now);
        Decision::Denied { retry_after_seconds: wait.as_secs().max(1) }
    }

    /// Tokens that would be available at `now`, without modifying the bucket.
    pub fn available_at(&self, bandwidth: &Bandwidth, now: Instant) -> u64 {
        let (tokens, _) = self.refilled(bandwidth, now);
        tokens
    }

    /// Time since the bucket last served a request.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen)
    }

    fn refill(&mut self, bandwidth: &Bandwidth, now: Instant) {
        let (tokens, last_refill) = self.refilled(bandwidth, now);
        self.tokens = tokens;
        self.last_refill = last_refill;
    }

    fn refilled(&self, bandwidth: &Bandwidth, now: Instant) -> (u64, Instant) {
        let interval = bandwidth.refill_interval();
        let elapsed = now.saturating_duration_since(self.last_refill);
        let periods = elapsed.as_nanos() / interval.as_nanos();
        if periods == 0 {
            return (self.tokens, self.last_refill);
        }

        let added = periods.saturating_mul(u128::from(bandwidth.refill_tokens()));
        let tokens = (u128::from(self.tokens) + added).min(u128::from(bandwidth.capacity()));
        let tokens = u64::try_from(tokens).unwrap_or(bandwidth.capacity());

        // periods <= elapsed / interval, so the advance never passes `now`.
        let advance = interval.as_nanos() * periods;
        let advance = Duration::from_nanos(u64::try_from(advance).unwrap_or(u64::MAX));
        let last_refill = self.last_refill.checked_add(advance).unwrap_or(now);

        (tokens, last_refill)
    }

    fn time_to_next_refill(&self, bandwidth: &Bandwidth, now: Instant) -> Duration {
        let elapsed = now.saturating_duration_since(self.last_refill);
        bandwidth.refill_interval().saturating_sub(elapsed)
    }
}
