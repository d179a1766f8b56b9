use serde::{Deserialize, Serialize};

/// Snapshot of a limiter's admission counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterStats {
    pub tracked_keys: usize,
    pub allowed: u64,
    pub denied: u64,
}

impl LimiterStats {
    pub fn total(&self) -> u64 {
        self.allowed + self.denied
    }
}

/// Running totals, updated while the owning lock is held
#[derive(Debug, Default)]
pub(crate) struct DecisionCounters {
    pub allowed: u64,
    pub denied: u64,
}

impl DecisionCounters {
    pub fn record(&mut self, allowed: bool) {
        if allowed {
            self.allowed += 1;
        } else {
            self.denied += 1;
        }
    }

    pub fn snapshot(&self, tracked_keys: usize) -> LimiterStats {
        LimiterStats {
            tracked_keys,
            allowed: self.allowed,
            denied: self.denied,
        }
    }
}
