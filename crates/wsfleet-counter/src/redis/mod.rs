//! Redis-backed shared counter
//!
//! - Standalone Redis endpoint behind a `deadpool-redis` pool
//! - `INCRBY`/`DECRBY` for atomic adjustment, `GET` for reads, `SET` for the
//!   one-time reset performed by the cluster controller
//! - Errors sanitized before they reach logs or HTTP responses

pub mod config;
pub mod counter;
pub mod pool;

pub use config::RedisCounterConfig;
pub use counter::RedisCounter;
pub use pool::RedisPoolUtils;
