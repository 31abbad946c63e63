//! Background eviction of idle buckets.

use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::limiter::RateLimiter;

/// Periodically evicts idle, full buckets from a [`RateLimiter`].
#[derive(Debug)]
pub struct IdleSweeper {
    limiter: Arc<RateLimiter>,
    idle_after: Duration,
    period: Duration,
    cancellation_token: CancellationToken,
}

impl IdleSweeper {
    /// Creates a sweeper that runs every `period` until `cancellation_token`
    /// is cancelled.
    pub fn new(
        limiter: Arc<RateLimiter>,
        idle_after: Duration,
        period: Duration,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self { limiter, idle_after, period, cancellation_token }
    }

    /// Runs one sweep immediately.
    pub fn sweep(&self) -> usize {
        let evicted = self.limiter.evict_idle(self.idle_after);
        if evicted > 0 {
            debug!(evicted, tracked = self.limiter.tracked_keys(), "evicted idle rate limit buckets");
        }
        evicted
    }

    /// Spawns the sweep loop onto the current runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self) {
        info!(
            idle_after_secs = self.idle_after.as_secs(),
            period_secs = self.period.as_secs(),
            "idle bucket sweeper starting"
        );

        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                () = self.cancellation_token.cancelled() => break,
                _ = ticker.tick() => {
                    self.sweep();
                }
            }
        }

        info!("idle bucket sweeper stopped");
    }
}
