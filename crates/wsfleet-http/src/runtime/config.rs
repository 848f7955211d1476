//! # Environment-Based Configuration
//!
//! Server settings are read from the environment so the same binary serves
//! single-process development and clustered deployments.
//!
//! ## Environment Variables
//!
//! ### Listener
//! - `WSFLEET_HOST` - Listening address (default: 0.0.0.0)
//! - `WSFLEET_PORT` - Listening port (default: 3000)
//!
//! ### Cluster
//! - `WSFLEET_CLUSTER_ENABLED` - Fork worker processes sharing the port (default: false)
//! - `WSFLEET_CLUSTER_CACHE_ENABLED` - Count connections in the shared cache (default: false)
//! - `WSFLEET_WORKERS` - Worker count (default: available parallelism)
//!
//! ### Shared cache
//! - `WSFLEET_CACHE_URL` - Redis endpoint (default: redis://127.0.0.1:6379)
//! - `WSFLEET_CACHE_TIMEOUT` - Per-attempt timeout, humantime format (default: 1s)
//! - `WSFLEET_CACHE_RETRIES` - Retries after a failed attempt (default: 1)
//! - `WSFLEET_CACHE_KEY_PREFIX` - Namespace for the counter key
//!
//! ### WebSocket
//! - `WSFLEET_MAX_MESSAGE_SIZE` - Inbound message ceiling in bytes (default: 1024)
//! - `WSFLEET_HEARTBEAT_INTERVAL` - Server ping interval, humantime or `0` to disable (default: disabled)
//! - `WSFLEET_OUTBOUND_BUFFER` - Per-connection outbound queue capacity (default: 64)

use crate::websocket::WebSocketConfig;
use std::{env, time::Duration};

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid environment variable '{key}': {message}")]
    InvalidEnvVar { key: String, message: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

const MAX_MESSAGE_CEILING: usize = 16 * 1024 * 1024;
const MAX_CACHE_RETRIES: u32 = 5;
const MAX_CACHE_TIMEOUT: Duration = Duration::from_secs(30);

/// Cluster membership settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterConfig {
    pub enabled: bool,
    /// Explicit worker count, `None` uses available parallelism
    pub workers: Option<usize>,
}

/// Shared cache settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub enabled: bool,
    pub url: String,
    pub timeout: Duration,
    pub retries: u32,
    pub key_prefix: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "redis://127.0.0.1:6379".to_string(),
            timeout: Duration::from_secs(1),
            retries: 1,
            key_prefix: None,
        }
    }
}

/// Complete worker/controller configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cluster: ClusterConfig,
    pub cache: CacheConfig,
    pub websocket: WebSocketConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            cluster: ClusterConfig::default(),
            cache: CacheConfig::default(),
            websocket: WebSocketConfig::default(),
        }
    }
}

impl ServerConfig {
    /// `host:port` string handed to the listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether connection counts go through the shared cache
    pub fn uses_shared_counter(&self) -> bool {
        self.cluster.enabled && self.cache.enabled
    }

    /// Redis counter settings derived from the cache section
    #[cfg(feature = "redis")]
    pub fn counter_config(&self) -> wsfleet_counter::RedisCounterConfig {
        let config = wsfleet_counter::RedisCounterConfig::standalone(&self.cache.url)
            .with_timeout(self.cache.timeout)
            .with_retries(self.cache.retries);
        match &self.cache.key_prefix {
            Some(prefix) => config.with_key_prefix(prefix.clone()),
            None => config,
        }
    }
}

/// Builder for [`ServerConfig`] with environment variable support
#[derive(Debug, Clone, Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Create a new builder with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any environment variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut builder = Self::default();

        if let Some(host) = get_env_string("WSFLEET_HOST") {
            builder = builder.host(host);
        }
        if let Some(port) = get_env_u16("WSFLEET_PORT")? {
            builder = builder.port(port);
        }

        if let Some(enabled) = get_env_bool("WSFLEET_CLUSTER_ENABLED")? {
            builder = builder.cluster_enabled(enabled);
        }
        if let Some(enabled) = get_env_bool("WSFLEET_CLUSTER_CACHE_ENABLED")? {
            builder = builder.cache_enabled(enabled);
        }
        if let Some(workers) = get_env_usize("WSFLEET_WORKERS")? {
            builder = builder.workers(workers);
        }

        if let Some(url) = get_env_string("WSFLEET_CACHE_URL") {
            builder = builder.cache_url(url);
        }
        if let Some(timeout) = get_env_duration("WSFLEET_CACHE_TIMEOUT")? {
            builder = builder.cache_timeout(timeout);
        }
        if let Some(retries) = get_env_u32("WSFLEET_CACHE_RETRIES")? {
            builder = builder.cache_retries(retries);
        }
        if let Some(prefix) = get_env_string("WSFLEET_CACHE_KEY_PREFIX") {
            builder = builder.cache_key_prefix(prefix);
        }

        if let Some(size) = get_env_usize("WSFLEET_MAX_MESSAGE_SIZE")? {
            builder = builder.max_message_size(size);
        }
        if let Some(interval) = get_env_duration("WSFLEET_HEARTBEAT_INTERVAL")? {
            builder = builder.heartbeat_interval(Some(interval));
        }
        if let Some(buffer) = get_env_usize("WSFLEET_OUTBOUND_BUFFER")? {
            builder = builder.outbound_buffer(buffer);
        }

        Ok(builder)
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn cluster_enabled(mut self, enabled: bool) -> Self {
        self.config.cluster.enabled = enabled;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.cluster.workers = Some(workers);
        self
    }

    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.config.cache.enabled = enabled;
        self
    }

    pub fn cache_url(mut self, url: impl Into<String>) -> Self {
        self.config.cache.url = url.into();
        self
    }

    pub fn cache_timeout(mut self, timeout: Duration) -> Self {
        self.config.cache.timeout = timeout;
        self
    }

    pub fn cache_retries(mut self, retries: u32) -> Self {
        self.config.cache.retries = retries;
        self
    }

    pub fn cache_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.cache.key_prefix = Some(prefix.into());
        self
    }

    pub fn max_message_size(mut self, size: usize) -> Self {
        self.config.websocket.max_message_size = size;
        self
    }

    /// Zero disables server pings
    pub fn heartbeat_interval(mut self, interval: Option<Duration>) -> Self {
        self.config.websocket.heartbeat_interval = interval.filter(|i| !i.is_zero());
        self
    }

    pub fn outbound_buffer(mut self, buffer: usize) -> Self {
        self.config.websocket.outbound_buffer = buffer;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if a value is out of range.
    pub fn build(self) -> Result<ServerConfig, ConfigError> {
        self.validate()?;
        Ok(self.config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let config = &self.config;

        if config.host.is_empty() {
            return Err(ConfigError::ValidationError(
                "host must not be empty".to_string(),
            ));
        }

        if config.cluster.workers == Some(0) {
            return Err(ConfigError::ValidationError(
                "workers must be greater than 0".to_string(),
            ));
        }

        if config.cache.url.is_empty() {
            return Err(ConfigError::ValidationError(
                "cache url must not be empty".to_string(),
            ));
        }
        if config.cache.timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "cache timeout must be greater than 0".to_string(),
            ));
        }
        if config.cache.timeout > MAX_CACHE_TIMEOUT {
            return Err(ConfigError::ValidationError(
                "cache timeout must be <= 30s".to_string(),
            ));
        }
        if config.cache.retries > MAX_CACHE_RETRIES {
            return Err(ConfigError::ValidationError(format!(
                "cache retries must be <= {MAX_CACHE_RETRIES}"
            )));
        }

        let ws = &config.websocket;
        if ws.max_message_size == 0 {
            return Err(ConfigError::ValidationError(
                "max_message_size must be greater than 0".to_string(),
            ));
        }
        if ws.max_message_size > MAX_MESSAGE_CEILING {
            return Err(ConfigError::ValidationError(
                "max_message_size must be <= 16MB".to_string(),
            ));
        }
        if ws.outbound_buffer == 0 {
            return Err(ConfigError::ValidationError(
                "outbound_buffer must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn get_env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|val| !val.trim().is_empty())
}

fn get_env_bool(key: &str) -> Result<Option<bool>, ConfigError> {
    match env::var(key) {
        Ok(val) => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message: format!(
                    "invalid boolean value '{val}', expected true/false/1/0/yes/no/on/off"
                ),
            }),
        },
        Err(_) => Ok(None),
    }
}

fn get_env_u16(key: &str) -> Result<Option<u16>, ConfigError> {
    match env::var(key) {
        Ok(val) => val
            .parse::<u16>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message: format!("invalid port value '{val}': {e}"),
            }),
        Err(_) => Ok(None),
    }
}

fn get_env_u32(key: &str) -> Result<Option<u32>, ConfigError> {
    match env::var(key) {
        Ok(val) => val
            .parse::<u32>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message: format!("invalid u32 value '{val}': {e}"),
            }),
        Err(_) => Ok(None),
    }
}

fn get_env_usize(key: &str) -> Result<Option<usize>, ConfigError> {
    match env::var(key) {
        Ok(val) => val
            .parse::<usize>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message: format!("invalid usize value '{val}': {e}"),
            }),
        Err(_) => Ok(None),
    }
}

/// Humantime duration; a bare `0` means zero
fn get_env_duration(key: &str) -> Result<Option<Duration>, ConfigError> {
    match env::var(key) {
        Ok(val) if val.trim() == "0" => Ok(Some(Duration::ZERO)),
        Ok(val) => humantime::parse_duration(val.trim())
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message: format!("invalid duration '{val}': {e}"),
            }),
        Err(_) => Ok(None),
    }
}
