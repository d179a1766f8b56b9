use thiserror::Error;

/// Errors raised while building a limiter from configuration.
///
/// Admission checks themselves never fail; a denied request is a `false`, not an error.
#[derive(Debug, Error)]
pub enum ThrottleError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] validator::ValidationErrors),

    #[error("Environment variable {name} has an invalid value: {reason}")]
    InvalidEnvVar { name: String, reason: String },

    #[error("Invalid duration '{input}': {reason}")]
    InvalidDuration { input: String, reason: String },
}

pub type ThrottleResult<T> = Result<T, ThrottleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ThrottleError::InvalidDuration {
            input: "soon".to_string(),
            reason: "unknown time unit".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid duration 'soon': unknown time unit");

        let err = ThrottleError::InvalidEnvVar {
            name: "THROTTLE_RATE".to_string(),
            reason: "invalid digit found in string".to_string(),
        };
        assert!(err.to_string().contains("THROTTLE_RATE"));
    }
}
