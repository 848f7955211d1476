//! Redis connection pool helpers

use deadpool_redis::{Config as PoolConfig, Connection as PooledConnection, Pool};
use redis::{ErrorKind as RedisErrorKind, RedisError};

use super::config::RedisCounterConfig;
use crate::error::CounterError;

/// Redis connection pool utility functions
pub struct RedisPoolUtils;

impl RedisPoolUtils {
    /// Create a connection pool for the configured endpoint.
    ///
    /// No connection is opened here; the first command dials lazily, so an
    /// unreachable cache does not prevent the pool from being built.
    pub fn create_pool(config: &RedisCounterConfig) -> Result<Pool, CounterError> {
        config.validate()?;

        let mut pool_config = PoolConfig::from_url(config.url.as_str());
        pool_config.pool = Some(deadpool_redis::PoolConfig::new(config.pool_size));
        pool_config
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .map_err(|e| {
                CounterError::InvalidConfig(format!("Failed to create connection pool: {}", e))
            })
    }

    /// Get a pooled connection
    pub async fn get_connection(pool: &Pool) -> Result<PooledConnection, CounterError> {
        pool.get().await.map_err(|e| {
            CounterError::Unavailable(format!("Failed to get connection from pool: {}", e))
        })
    }

    /// Classify a Redis error, sanitizing the message for logs and responses
    pub fn classify(error: &RedisError) -> CounterError {
        if error.is_io_error() || error.is_connection_refusal() || error.is_connection_dropped()
        {
            return CounterError::Unavailable(Self::sanitize_error(error));
        }
        CounterError::Command(Self::sanitize_error(error))
    }

    /// Sanitize Redis errors for security
    pub fn sanitize_error(error: &RedisError) -> String {
        match error.kind() {
            RedisErrorKind::AuthenticationFailed => "Authentication failed".to_string(),
            RedisErrorKind::TypeError => "Data type error".to_string(),
            RedisErrorKind::BusyLoadingError => "Redis is loading data".to_string(),
            RedisErrorKind::ReadOnly => "Redis is read-only".to_string(),
            _ if error.is_timeout() => "Operation timeout".to_string(),
            _ if error.is_io_error() || error.is_connection_refusal() => {
                "Connection error".to_string()
            }
            _ => "Redis operation failed".to_string(),
        }
    }
}
