use crate::config::LimiterConfig;
use crate::error::ThrottleResult;
use crate::limiter::KeyedLimiter;
use crate::stats::{DecisionCounters, LimiterStats};
use crate::token_bucket::TokenBucket;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, trace};
use validator::Validate;

/// Per-key token bucket limiter behind a single lock.
///
/// Every key gets a bucket holding up to `rate` tokens, refilled lazily at
/// `rate` tokens per `interval` whenever the key is checked. One mutex covers
/// the whole map, so each check (lookup, refill and decrement) is atomic with
/// respect to every other check, whatever the key.
///
/// Buckets are never evicted: an unbounded set of distinct keys grows memory
/// without bound. Use [`reset`](Self::reset) to drop a key explicitly.
///
/// `rate` and `interval` are expected to be non-zero. A zero `rate` denies
/// everything; a zero `interval` refills fully on every call. Use
/// [`try_new`](Self::try_new) or [`from_config`](Self::from_config) to have
/// them checked.
#[derive(Debug)]
pub struct RateLimiter {
    rate: u32,
    interval: Duration,
    state: Mutex<LimiterState>,
}

#[derive(Debug, Default)]
struct LimiterState {
    buckets: HashMap<String, TokenBucket>,
    counters: DecisionCounters,
}

impl RateLimiter {
    pub fn new(rate: u32, interval: Duration) -> Self {
        Self {
            rate,
            interval,
            state: Mutex::new(LimiterState::default()),
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
        let mut state = self.lock();
        let LimiterState { buckets, counters } = &mut *state;

        let bucket = buckets.entry(key.to_string()).or_insert_with(|| {
            debug!(key, rate = self.rate, "Creating token bucket");
            TokenBucket::new(self.rate, now)
        });

        bucket.refill(now, self.rate, self.interval);
        let allowed = bucket.try_consume();
        counters.record(allowed);

        trace!(key, allowed, tokens = bucket.tokens(), "Rate limit decision");
        allowed
    }

    /// Tokens the key could spend right now; `rate` for a key never seen
    pub fn remaining(&self, key: &str) -> u32 {
        self.remaining_at(key, Instant::now())
    }

    /// Tokens the key could spend as of `now`, without consuming or inserting
    pub fn remaining_at(&self, key: &str, now: Instant) -> u32 {
        let state = self.lock();
        match state.buckets.get(key) {
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
        let removed = self.lock().buckets.remove(key).is_some();
        if removed {
            debug!(key, "Reset token bucket");
        }
        removed
    }

    pub fn tracked_keys(&self) -> usize {
        self.lock().buckets.len()
    }

    pub fn stats(&self) -> LimiterStats {
        let state = self.lock();
        state.counters.snapshot(state.buckets.len())
    }

    // No code path panics while holding the lock, so a poisoned map is still consistent
    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyedLimiter for RateLimiter {
    fn allow_at(&self, key: &str, now: Instant) -> bool {
        RateLimiter::allow_at(self, key, now)
    }

    fn remaining_at(&self, key: &str, now: Instant) -> u32 {
        RateLimiter::remaining_at(self, key, now)
    }

    fn reset(&self, key: &str) -> bool {
        RateLimiter::reset(self, key)
    }

    fn tracked_keys(&self) -> usize {
        RateLimiter::tracked_keys(self)
    }

    fn stats(&self) -> LimiterStats {
        RateLimiter::stats(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ThrottleError;

    const SECOND: Duration = Duration::from_secs(1);
    const CLIENT: &str = "192.168.1.1";

    fn exhaust(limiter: &RateLimiter, key: &str, now: Instant) {
        for i in 0..limiter.rate() {
            assert!(limiter.allow_at(key, now), "request {} should be allowed", i + 1);
        }
    }

    #[test]
    fn test_allows_up_to_capacity() {
        let limiter = RateLimiter::new(5, SECOND);
        let now = Instant::now();

        exhaust(&limiter, CLIENT, now);
        assert!(!limiter.allow_at(CLIENT, now));
    }

    #[test]
    fn test_keys_are_isolated() {
        let limiter = RateLimiter::new(5, SECOND);
        let now = Instant::now();

        exhaust(&limiter, "192.168.1.1", now);
        assert!(!limiter.allow_at("192.168.1.1", now));

        exhaust(&limiter, "192.168.1.2", now);
        assert!(!limiter.allow_at("192.168.1.2", now));
        assert_eq!(limiter.tracked_keys(), 2);
    }

    #[test]
    fn test_full_refill_after_interval() {
        let limiter = RateLimiter::new(5, SECOND);
        let start = Instant::now();
        exhaust(&limiter, CLIENT, start);

        let later = start + SECOND;
        exhaust(&limiter, CLIENT, later);
        assert!(!limiter.allow_at(CLIENT, later));
    }

    #[test]
    fn test_partial_refill_is_proportional() {
        let limiter = RateLimiter::new(5, SECOND);
        let start = Instant::now();
        exhaust(&limiter, CLIENT, start);

        // floor(0.5 * 5) = 2
        let half = start + Duration::from_millis(500);
        assert!(limiter.allow_at(CLIENT, half));
        assert!(limiter.allow_at(CLIENT, half));
        assert!(!limiter.allow_at(CLIENT, half));
    }

    #[test]
    fn test_multiple_intervals_do_not_accumulate() {
        let limiter = RateLimiter::new(5, SECOND);
        let start = Instant::now();
        exhaust(&limiter, CLIENT, start);

        let much_later = start + SECOND * 10;
        assert_eq!(limiter.remaining_at(CLIENT, much_later), 5);
        exhaust(&limiter, CLIENT, much_later);
        assert!(!limiter.allow_at(CLIENT, much_later));
    }

    #[test]
    fn test_repeated_denial_has_no_side_effects() {
        let limiter = RateLimiter::new(2, SECOND);
        let now = Instant::now();
        exhaust(&limiter, CLIENT, now);

        for _ in 0..10 {
            assert!(!limiter.allow_at(CLIENT, now));
        }
        assert_eq!(limiter.remaining_at(CLIENT, now), 0);

        // Denials did not push the refill clock forward
        assert!(limiter.allow_at(CLIENT, now + SECOND / 2));
    }

    #[test]
    fn test_fractional_time_carries_over() {
        // One token every 100ms, polled every 60ms: 1200ms must earn 12 tokens
        let limiter = RateLimiter::new(10, SECOND);
        let start = Instant::now();
        exhaust(&limiter, CLIENT, start);

        let mut granted = 0;
        for step in 1..=20u32 {
            if limiter.allow_at(CLIENT, start + Duration::from_millis(60) * step) {
                granted += 1;
            }
        }
        assert_eq!(granted, 12);
    }

    #[test]
    fn test_remaining_does_not_consume_or_insert() {
        let limiter = RateLimiter::new(3, SECOND);
        assert_eq!(limiter.remaining(CLIENT), 3);
        assert_eq!(limiter.tracked_keys(), 0);

        let now = Instant::now();
        assert!(limiter.allow_at(CLIENT, now));
        assert_eq!(limiter.remaining_at(CLIENT, now), 2);
        assert_eq!(limiter.remaining_at(CLIENT, now), 2);
    }

    #[test]
    fn test_reset_restores_full_bucket() {
        let limiter = RateLimiter::new(2, SECOND);
        let now = Instant::now();
        exhaust(&limiter, CLIENT, now);
        assert!(!limiter.allow_at(CLIENT, now));

        assert!(limiter.reset(CLIENT));
        assert!(!limiter.reset(CLIENT));
        assert!(limiter.allow_at(CLIENT, now));
    }

    #[test]
    fn test_stats_track_decisions() {
        let limiter = RateLimiter::new(1, SECOND);
        let now = Instant::now();
        limiter.allow_at("a", now);
        limiter.allow_at("a", now);
        limiter.allow_at("b", now);

        let stats = limiter.stats();
        assert_eq!(stats.allowed, 2);
        assert_eq!(stats.denied, 1);
        assert_eq!(stats.tracked_keys, 2);
    }

    #[test]
    fn test_zero_rate_denies_everything() {
        let limiter = RateLimiter::new(0, SECOND);
        let now = Instant::now();
        assert!(!limiter.allow_at(CLIENT, now));
        assert!(!limiter.allow_at(CLIENT, now + Duration::from_millis(500)));
    }

    #[test]
    fn test_zero_interval_always_refills() {
        let limiter = RateLimiter::new(1, Duration::ZERO);
        let now = Instant::now();
        for _ in 0..5 {
            assert!(limiter.allow_at(CLIENT, now));
        }
    }

    #[test]
    fn test_from_config_validates() {
        let limiter = RateLimiter::from_config(&LimiterConfig::new(10, SECOND)).unwrap();
        assert_eq!(limiter.rate(), 10);
        assert_eq!(limiter.interval(), SECOND);

        let err = RateLimiter::from_config(&LimiterConfig::new(0, SECOND)).unwrap_err();
        assert!(matches!(err, ThrottleError::InvalidConfig(_)));
    }

    #[test]
    fn test_direct_and_config_construction_reject_alike() {
        let direct = RateLimiter::try_new(0, SECOND).unwrap_err();
        let configured = RateLimiter::from_config(&LimiterConfig::new(0, SECOND)).unwrap_err();
        assert!(matches!(direct, ThrottleError::InvalidConfig(_)));
        assert!(matches!(configured, ThrottleError::InvalidConfig(_)));
        assert_eq!(direct.to_string(), configured.to_string());

        let direct = RateLimiter::try_new(5, Duration::ZERO).unwrap_err();
        match direct {
            ThrottleError::InvalidConfig(errors) => {
                assert!(errors.field_errors().contains_key("interval"));
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(RateLimiter::try_new(5, SECOND).is_ok());
    }
}
