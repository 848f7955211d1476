//! # wsfleet shared counter
//!
//! Cluster-wide active connection counter for wsfleet workers.
//!
//! Every worker process mutates one integer stored in an external cache with
//! atomic increment/decrement. The value approximates the sum of open
//! connections across the cluster; it is a best-effort aggregate, never a lock.
//!
//! ## Backends
//!
//! - **[InMemoryCounter]**: process-local stand-in with outage simulation
//! - **[RedisCounter]**: Redis-backed counter (requires `redis` feature)
//!
//! ## Failure policy
//!
//! [`SharedCounter::adjust`] never fails from the caller's point of view. Each
//! attempt is bounded by [`RetryPolicy::timeout`] and retried at most
//! [`RetryPolicy::retries`] times; when every attempt fails the outcome is
//! [`AdjustOutcome::Degraded`] and the failure is logged. Reads surface their
//! failure so callers can report it instead of inventing a value.

mod counter;
mod error;
mod in_memory;

#[cfg(feature = "redis")]
pub mod redis;

pub use counter::{ACTIVE_CONNECTIONS_KEY, AdjustOutcome, RetryPolicy, SharedCounter};
pub use error::{CounterError, CounterResult};
pub use in_memory::InMemoryCounter;

#[cfg(feature = "redis")]
pub use redis::{RedisCounter, RedisCounterConfig};
