//! Per-key token bucket rate limiting.
//!
//! A [`RateLimiter`] lazily creates one [`TokenBucket`] per key, all with
//! the same [`Bandwidth`](tollgate_core::Bandwidth). Consuming from one key
//! never waits on another key's lock, and concurrent consumers of the same
//! key are serialized so no more than the available tokens are ever
//! granted.
//!
//! ```text
//!   request ──► key ──► registry shard (read) ──► Arc<Mutex<TokenBucket>>
//!                                                        │
//!                                        lock ─► refill ─► take 1 ─► Decision
//! ```
//!
//! The [`IdleSweeper`] bounds memory by evicting buckets that are idle and
//! already full, which cannot change any future decision.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bucket;
pub mod limiter;
pub mod sweeper;

pub use bucket::{Decision, TokenBucket};
pub use limiter::RateLimiter;
pub use sweeper::IdleSweeper;
