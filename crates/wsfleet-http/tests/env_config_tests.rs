//! Integration tests for environment-based configuration

use serial_test::serial;
use std::{env, time::Duration};
use wsfleet_http::runtime::{ConfigError, ServerConfigBuilder};

const VARS: &[&str] = &[
    "WSFLEET_HOST",
    "WSFLEET_PORT",
    "WSFLEET_CLUSTER_ENABLED",
    "WSFLEET_CLUSTER_CACHE_ENABLED",
    "WSFLEET_WORKERS",
    "WSFLEET_CACHE_URL",
    "WSFLEET_CACHE_TIMEOUT",
    "WSFLEET_CACHE_RETRIES",
    "WSFLEET_CACHE_KEY_PREFIX",
    "WSFLEET_MAX_MESSAGE_SIZE",
    "WSFLEET_HEARTBEAT_INTERVAL",
    "WSFLEET_OUTBOUND_BUFFER",
];

/// Helper to set environment variable for test
fn set_env(key: &str, value: &str) {
    unsafe {
        env::set_var(key, value);
    }
}

fn clear_all_wsfleet_env_vars() {
    for key in VARS {
        unsafe {
            env::remove_var(key);
        }
    }
}

#[test]
#[serial]
fn test_env_config_default_when_no_vars_set() {
    clear_all_wsfleet_env_vars();

    let config = ServerConfigBuilder::from_env()
        .expect("should load defaults when no env vars set")
        .build()
        .expect("should build valid config");

    assert_eq!(config.host, "0.0.0.0");
    assert_eq!(config.port, 3000);
    assert!(!config.cluster.enabled);
    assert!(config.cluster.workers.is_none());
    assert!(!config.cache.enabled);
    assert_eq!(config.cache.url, "redis://127.0.0.1:6379");
    assert_eq!(config.cache.timeout, Duration::from_secs(1));
    assert_eq!(config.cache.retries, 1);
    assert_eq!(config.websocket.max_message_size, 1024);
    assert_eq!(config.websocket.outbound_buffer, 64);
}

#[test]
#[serial]
fn test_env_config_cluster_and_cache() {
    clear_all_wsfleet_env_vars();
    set_env("WSFLEET_CLUSTER_ENABLED", "true");
    set_env("WSFLEET_CLUSTER_CACHE_ENABLED", "yes");
    set_env("WSFLEET_WORKERS", "4");
    set_env("WSFLEET_CACHE_URL", "redis://cache.internal:6379");
    set_env("WSFLEET_CACHE_TIMEOUT", "250ms");
    set_env("WSFLEET_CACHE_RETRIES", "2");
    set_env("WSFLEET_CACHE_KEY_PREFIX", "edge");

    let config = ServerConfigBuilder::from_env()
        .expect("should load config")
        .build()
        .expect("should build valid config");

    assert!(config.cluster.enabled);
    assert!(config.cache.enabled);
    assert!(config.uses_shared_counter());
    assert_eq!(config.cluster.workers, Some(4));
    assert_eq!(config.cache.url, "redis://cache.internal:6379");
    assert_eq!(config.cache.timeout, Duration::from_millis(250));
    assert_eq!(config.cache.retries, 2);
    assert_eq!(config.cache.key_prefix.as_deref(), Some("edge"));

    clear_all_wsfleet_env_vars();
}

#[test]
#[serial]
fn test_env_config_listener_and_websocket() {
    clear_all_wsfleet_env_vars();
    set_env("WSFLEET_HOST", "127.0.0.1");
    set_env("WSFLEET_PORT", "8081");
    set_env("WSFLEET_MAX_MESSAGE_SIZE", "4096");
    set_env("WSFLEET_HEARTBEAT_INTERVAL", "30s");
    set_env("WSFLEET_OUTBOUND_BUFFER", "8");

    let config = ServerConfigBuilder::from_env()
        .expect("should load config")
        .build()
        .expect("should build valid config");

    assert_eq!(config.bind_addr(), "127.0.0.1:8081");
    assert_eq!(config.websocket.max_message_size, 4096);
    assert_eq!(
        config.websocket.heartbeat_interval,
        Some(Duration::from_secs(30))
    );
    assert_eq!(config.websocket.outbound_buffer, 8);

    clear_all_wsfleet_env_vars();
}

#[test]
#[serial]
fn test_env_config_zero_heartbeat_disables() {
    clear_all_wsfleet_env_vars();
    set_env("WSFLEET_HEARTBEAT_INTERVAL", "0");

    let config = ServerConfigBuilder::from_env()
        .expect("should load config")
        .build()
        .expect("should build valid config");
    assert!(config.websocket.heartbeat_interval.is_none());

    clear_all_wsfleet_env_vars();
}

#[test]
#[serial]
fn test_env_config_invalid_bool() {
    clear_all_wsfleet_env_vars();
    set_env("WSFLEET_CLUSTER_ENABLED", "sometimes");

    let result = ServerConfigBuilder::from_env();
    assert!(matches!(
        result,
        Err(ConfigError::InvalidEnvVar { ref key, .. }) if key == "WSFLEET_CLUSTER_ENABLED"
    ));

    clear_all_wsfleet_env_vars();
}

#[test]
#[serial]
fn test_env_config_invalid_port() {
    clear_all_wsfleet_env_vars();
    set_env("WSFLEET_PORT", "70000");

    assert!(matches!(
        ServerConfigBuilder::from_env(),
        Err(ConfigError::InvalidEnvVar { .. })
    ));

    clear_all_wsfleet_env_vars();
}

#[test]
#[serial]
fn test_env_config_invalid_duration() {
    clear_all_wsfleet_env_vars();
    set_env("WSFLEET_CACHE_TIMEOUT", "soon");

    assert!(matches!(
        ServerConfigBuilder::from_env(),
        Err(ConfigError::InvalidEnvVar { .. })
    ));

    clear_all_wsfleet_env_vars();
}

#[test]
#[serial]
fn test_env_config_validation_failure() {
    clear_all_wsfleet_env_vars();
    set_env("WSFLEET_CACHE_RETRIES", "9");

    let result = ServerConfigBuilder::from_env()
        .expect("values parse")
        .build();
    assert!(matches!(result, Err(ConfigError::ValidationError(_))));

    clear_all_wsfleet_env_vars();
}
