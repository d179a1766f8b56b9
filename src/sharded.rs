use crate::config::LimiterConfig;
use crate::error::ThrottleResult;
use crate::limiter::KeyedLimiter;
use crate::stats::LimiterStats;
use crate::token_bucket::TokenBucket;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, trace};
use validator::Validate;

/// Token bucket limiter with the key space split across independently locked shards.
///
/// Same admission semantics as [`RateLimiter`](crate::RateLimiter). The shard lock
/// for a key is held across lookup, refill and decrement, so checks on one key stay
/// atomic while unrelated keys in other shards proceed in parallel.
#[derive(Debug)]
pub struct ShardedRateLimiter {
    rate: u32,
    interval: Duration,
    buckets: DashMap<String, TokenBucket>,
    allowed: AtomicU64,
    denied: AtomicU64,
}

impl ShardedRateLimiter {
    pub fn new(rate: u32, interval: Duration) -> Self {
        Self {
            rate,
            interval,
            buckets: DashMap::new(),
            allowed: AtomicU64::new(0),
            denied: AtomicU64::new(0),
        }
    }

    /// Like [`new`](Self::new), but rejects a zero `rate` or `interval`
    pub fn try_new(rate: u32, interval: Duration) -> ThrottleResult<Self> {
        Self::from_config(&LimiterConfig::new(rate, interval))
    }

    /// Validate the configuration, then build an empty limiter
    pub fn from_config(config: &LimiterConfig) -> ThrottleResult<Self> {
        config.validate()?;
        Ok(Self::new(config.rate, config.interval))
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Check the key against the current time, consuming a token when allowed
    pub fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    /// Check the key as of `now`, consuming a token when allowed
    pub fn allow_at(&self, key: &str, now: Instant) -> bool {
        // Skip the key allocation on the hot path when the bucket already exists
        if let Some(mut bucket) = self.buckets.get_mut(key) {
            return self.decide(key, &mut bucket, now);
        }

        let mut bucket = self.buckets.entry(key.to_string()).or_insert_with(|| {
            debug!(key, rate = self.rate, "Creating token bucket");
            TokenBucket::new(self.rate, now)
        });
        self.decide(key, &mut bucket, now)
    }

    /// Tokens the key could spend right now; `rate` for a key never seen
    pub fn remaining(&self, key: &str) -> u32 {
        self.remaining_at(key, Instant::now())
    }

    /// Tokens the key could spend as of `now`, without consuming or inserting
    pub fn remaining_at(&self, key: &str, now: Instant) -> u32 {
        match self.buckets.get(key) {
            Some(bucket) => {
                let mut probe = bucket.clone();
                probe.refill(now, self.rate, self.interval);
                probe.tokens()
            }
            None => self.rate,
        }
    }

    /// Drop the key's bucket; returns whether one existed
    pub fn reset(&self, key: &str) -> bool {
        let removed = self.buckets.remove(key).is_some();
        if removed {
            debug!(key, "Reset token bucket");
        }
        removed
    }

    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }

    pub fn stats(&self) -> LimiterStats {
        LimiterStats {
            tracked_keys: self.buckets.len(),
            allowed: self.allowed.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
        }
    }

    fn decide(&self, key: &str, bucket: &mut TokenBucket, now: Instant) -> bool {
        bucket.refill(now, self.rate, self.interval);
        let allowed = bucket.try_consume();

        let counter = if allowed { &self.allowed } else { &self.denied };
        counter.fetch_add(1, Ordering::Relaxed);

        trace!(key, allowed, tokens = bucket.tokens(), "Rate limit decision");
        allowed
    }
}

impl KeyedLimiter for ShardedRateLimiter {
    fn allow_at(&self, key: &str, now: Instant) -> bool {
        ShardedRateLimiter::allow_at(self, key, now)
    }

    fn remaining_at(&self, key: &str, now: Instant) -> u32 {
        ShardedRateLimiter::remaining_at(self, key, now)
    }

    fn reset(&self, key: &str) -> bool {
        ShardedRateLimiter::reset(self, key)
    }

    fn tracked_keys(&self) -> usize {
        ShardedRateLimiter::tracked_keys(self)
    }

    fn stats(&self) -> LimiterStats {
        ShardedRateLimiter::stats(self)
    }
}
