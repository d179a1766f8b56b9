use std::time::{Duration, Instant};

/// A single key's bucket: whole tokens plus the instant the last credited token was earned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBucket {
    tokens: u32,
    last_refill: Instant,
}

impl TokenBucket {
    /// A full bucket observed for the first time at `now`
    pub fn new(rate: u32, now: Instant) -> Self {
        Self {
            tokens: rate,
            last_refill: now,
        }
    }

    pub fn tokens(&self) -> u32 {
        self.tokens
    }

    pub fn last_refill(&self) -> Instant {
        self.last_refill
    }

    /// Credit the tokens earned since the last refill.
    ///
    /// A whole interval or more snaps the bucket to full. Less than that credits
    /// `floor(elapsed / interval * rate)` tokens and advances `last_refill` only by
    /// the time those tokens are worth, so the fractional remainder carries over.
    pub fn refill(&mut self, now: Instant, rate: u32, interval: Duration) {
        let elapsed = now.saturating_duration_since(self.last_refill);

        if elapsed >= interval {
            self.tokens = rate;
            self.last_refill = now;
            return;
        }

        // rate == 0 never earns anything and would divide by zero below
        if rate == 0 {
            return;
        }

        // elapsed < interval here, so the products stay well inside u128
        let interval_nanos = interval.as_nanos();
        let refill = elapsed.as_nanos() * u128::from(rate) / interval_nanos;
        if refill == 0 {
            return;
        }

        // refill < rate, so it fits in u32
        let refill = refill as u32;
        self.tokens = self.tokens.saturating_add(refill).min(rate);

        let spent_nanos = u128::from(refill) * interval_nanos / u128::from(rate);
        self.last_refill += nanos_to_duration(spent_nanos);
    }

    /// Take one token if any remain
    pub fn try_consume(&mut self) -> bool {
        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }
}

fn nanos_to_duration(nanos: u128) -> Duration {
    const NANOS_PER_SEC: u128 = 1_000_000_000;
    Duration::new(
        (nanos / NANOS_PER_SEC) as u64,
        (nanos % NANOS_PER_SEC) as u32,
    )
}
