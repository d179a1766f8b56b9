//! Common interface over the keyed limiters.
//!
//! Both [`RateLimiter`](crate::RateLimiter) and
//! [`ShardedRateLimiter`](crate::ShardedRateLimiter) implement it, so callers
//! such as request middleware can stay generic over the locking strategy.

use crate::stats::LimiterStats;
use std::time::Instant;

/// Trait for keyed token bucket limiters
pub trait KeyedLimiter: Send + Sync {
    /// Refill the key's bucket as of `now`, then take one token if available
    fn allow_at(&self, key: &str, now: Instant) -> bool;

    /// Admission check against the current time
    fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    /// Tokens the key could spend as of `now`, without consuming any
    fn remaining_at(&self, key: &str, now: Instant) -> u32;

    /// Tokens the key could spend right now, without consuming any
    fn remaining(&self, key: &str) -> u32 {
        self.remaining_at(key, Instant::now())
    }

    /// Drop the key's bucket so its next request starts full
    fn reset(&self, key: &str) -> bool;

    /// Number of keys currently holding a bucket
    fn tracked_keys(&self) -> usize;

    /// Admission counters since construction
    fn stats(&self) -> LimiterStats;
}
