use crate::error::{ThrottleError, ThrottleResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::{Validate, ValidationError};

/// Environment variable holding the bucket capacity / refill target
pub const RATE_ENV: &str = "THROTTLE_RATE";
/// Environment variable holding the refill interval, e.g. `1s` or `250ms`
pub const INTERVAL_ENV: &str = "THROTTLE_INTERVAL";

const DEFAULT_RATE: u32 = 5;
const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Limiter configuration: `rate` tokens per bucket, refilled over `interval`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct LimiterConfig {
    #[validate(range(min = 1, message = "rate must be greater than 0"))]
    pub rate: u32,

    #[serde(with = "humantime_serde")]
    #[validate(custom(function = "validate_nonzero_interval"))]
    pub interval: Duration,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            rate: DEFAULT_RATE,
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl LimiterConfig {
    pub fn new(rate: u32, interval: Duration) -> Self {
        Self { rate, interval }
    }

    /// Load configuration from the environment, reading a `.env` file first if one exists.
    ///
    /// Unset variables fall back to the defaults; the result is validated.
    pub fn from_env() -> ThrottleResult<Self> {
        dotenv::dotenv().ok();
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_vars<F>(lookup: F) -> ThrottleResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(RATE_ENV) {
            config.rate = raw.trim().parse().map_err(|e: std::num::ParseIntError| {
                ThrottleError::InvalidEnvVar {
                    name: RATE_ENV.to_string(),
                    reason: e.to_string(),
                }
            })?;
        }

        if let Some(raw) = lookup(INTERVAL_ENV) {
            config.interval = parse_interval(&raw)?;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Parse a human readable duration such as `1s`, `500ms` or `1m 30s`
pub fn parse_interval(raw: &str) -> ThrottleResult<Duration> {
    humantime_serde::re::humantime::parse_duration(raw.trim()).map_err(|e| {
        ThrottleError::InvalidDuration {
            input: raw.to_string(),
            reason: e.to_string(),
        }
    })
}

fn validate_nonzero_interval(interval: &Duration) -> Result<(), ValidationError> {
    if interval.is_zero() {
        return Err(ValidationError::new("interval_zero")
            .with_message("interval must be greater than 0".into()));
    }
    Ok(())
}
