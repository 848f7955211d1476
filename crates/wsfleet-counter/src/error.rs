//! Shared counter errors

use std::time::Duration;

/// Errors raised while talking to the shared cache
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CounterError {
    /// A single attempt exceeded the configured timeout
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// The cache could not be reached (pool exhausted, connection refused, ...)
    #[error("shared cache unavailable: {0}")]
    Unavailable(String),

    /// The cache answered with an error
    #[error("shared cache command failed: {0}")]
    Command(String),

    /// Counter configuration was rejected
    #[error("invalid counter configuration: {0}")]
    InvalidConfig(String),
}

impl CounterError {
    /// Whether another attempt could plausibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Unavailable(_))
    }
}

/// Result alias for counter operations
pub type CounterResult<T> = Result<T, CounterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        let timeout = CounterError::Timeout {
            operation: "INCRBY",
            timeout: Duration::from_millis(10),
        };
        assert!(timeout.is_transient());
        assert!(CounterError::Unavailable("refused".into()).is_transient());
        assert!(!CounterError::Command("WRONGTYPE".into()).is_transient());
        assert!(!CounterError::InvalidConfig("empty url".into()).is_transient());
    }

    #[test]
    fn timeout_message_names_operation() {
        let err = CounterError::Timeout {
            operation: "GET",
            timeout: Duration::from_secs(1),
        };
        assert_eq!(err.to_string(), "GET timed out after 1s");
    }
}
