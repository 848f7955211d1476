//! Redis counter configuration

use crate::{
    counter::{ACTIVE_CONNECTIONS_KEY, RetryPolicy},
    error::CounterError,
};
use std::time::Duration;

/// Connection settings for [`RedisCounter`](super::RedisCounter)
#[derive(Debug, Clone)]
pub struct RedisCounterConfig {
    /// Redis endpoint, e.g. `redis://127.0.0.1:6379`
    pub url: String,
    /// Connection pool size
    pub pool_size: usize,
    /// Per-attempt timeout and retry budget
    pub policy: RetryPolicy,
    /// Key prefix for namespace isolation
    pub key_prefix: Option<String>,
}

impl Default for RedisCounterConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            pool_size: 4,
            policy: RetryPolicy::default(),
            key_prefix: None,
        }
    }
}

impl RedisCounterConfig {
    /// Create config for a standalone Redis endpoint
    pub fn standalone(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Default::default()
        }
    }

    /// Set connection pool size
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Set per-attempt timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.policy.timeout = timeout;
        self
    }

    /// Set the number of retries after a failed attempt
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.policy.retries = retries;
        self
    }

    /// Set key prefix for namespace isolation
    pub fn with_key_prefix(mut self, prefix: String) -> Self {
        self.key_prefix = Some(prefix);
        self
    }

    /// Key the counter is stored under, prefix applied
    pub fn counter_key(&self) -> String {
        match &self.key_prefix {
            Some(prefix) => format!("{}:{}", prefix, ACTIVE_CONNECTIONS_KEY),
            None => ACTIVE_CONNECTIONS_KEY.to_string(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), CounterError> {
        if self.url.is_empty() {
            return Err(CounterError::InvalidConfig(
                "Redis URL cannot be empty".to_string(),
            ));
        }
        if !self.url.starts_with("redis://") && !self.url.starts_with("rediss://") {
            return Err(CounterError::InvalidConfig(format!(
                "Redis URL must use redis:// or rediss:// scheme, got '{}'",
                self.url
            )));
        }
        if self.pool_size == 0 {
            return Err(CounterError::InvalidConfig(
                "Pool size cannot be zero".to_string(),
            ));
        }
        if self.pool_size > 100 {
            return Err(CounterError::InvalidConfig(
                "Pool size too large (max 100)".to_string(),
            ));
        }
        if self.policy.timeout.is_zero() {
            return Err(CounterError::InvalidConfig(
                "Timeout must be greater than zero".to_string(),
            ));
        }
        if matches!(&self.key_prefix, Some(prefix) if prefix.is_empty()) {
            return Err(CounterError::InvalidConfig(
                "Key prefix cannot be empty when set".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_key_is_unprefixed() {
        assert_eq!(
            RedisCounterConfig::default().counter_key(),
            "ws:active-connections"
        );
    }

    #[test]
    fn prefix_is_applied() {
        let config = RedisCounterConfig::default().with_key_prefix("staging".to_string());
        assert_eq!(config.counter_key(), "staging:ws:active-connections");
    }

    #[test]
    fn validation_rejects_bad_values() {
        assert!(RedisCounterConfig::standalone("").validate().is_err());
        assert!(
            RedisCounterConfig::standalone("http://localhost")
                .validate()
                .is_err()
        );
        assert!(
            RedisCounterConfig::default()
                .with_pool_size(0)
                .validate()
                .is_err()
        );
        assert!(
            RedisCounterConfig::default()
                .with_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(RedisCounterConfig::default().validate().is_ok());
    }
}
