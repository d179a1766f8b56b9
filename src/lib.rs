//! Per-key token bucket rate limiting for in-process callers.
//!
//! ```
//! use std::time::Duration;
//! use keyed_throttle::RateLimiter;
//!
//! let limiter = RateLimiter::new(5, Duration::from_secs(1));
//! for _ in 0..5 {
//!     assert!(limiter.allow("192.168.1.1"));
//! }
//! assert!(!limiter.allow("192.168.1.1"));
//! assert!(limiter.allow("192.168.1.2"));
//! ```

pub mod config;
pub mod error;
pub mod limiter;
pub mod rate_limiter;
pub mod sharded;
pub mod stats;
pub mod token_bucket;

pub use config::LimiterConfig;
pub use error::{ThrottleError, ThrottleResult};
pub use limiter::KeyedLimiter;
pub use rate_limiter::RateLimiter;
pub use sharded::ShardedRateLimiter;
pub use stats::LimiterStats;
