//! # wsfleet
//!
//! Clustered real-time WebSocket connection server.
//!
//! Each worker process accepts WebSocket connections, answers every data
//! message with the sha256 digest of its payload, keeps the connection alive
//! with ping/pong heartbeats and delivers messages pushed through
//! `POST /message`. Workers share one listening port and keep a cluster-wide
//! active connection count in Redis, exposed through `GET /stats`.
//!
//! ## Crates
//!
//! - **[counter]**: the shared active-connection counter and its backends
//! - **[http]**: connection registry, protocol handling, HTTP surface,
//!   worker serve loop and cluster controller
//!
//! The `wsfleet` binary lives in the `wsfleet-cli` package.

pub use wsfleet_counter as counter;
pub use wsfleet_http as http;

pub use wsfleet_counter::{AdjustOutcome, CounterError, InMemoryCounter, SharedCounter};
pub use wsfleet_http::{
    ClusterController, ConnectionRegistry, ConnectionTracker, ControllerExit, WorkerCommand,
    runtime::{AppState, ServerConfig, ServerConfigBuilder, ServerError, ShutdownKind, WorkerServer},
};

#[cfg(feature = "redis")]
pub use wsfleet_counter::{RedisCounter, RedisCounterConfig};
