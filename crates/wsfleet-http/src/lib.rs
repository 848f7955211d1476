//! # wsfleet HTTP runtime
//!
//! Worker and controller logic for a clustered WebSocket server.
//!
//! ## Surfaces
//!
//! - **WebSocket** (`GET /`): every inbound message is answered with the
//!   SHA-256 digest of its bytes, `{"sha": "<hex>"}`
//! - **Command dispatch** (`POST /message`): deliver a payload to a connection
//!   owned by the receiving worker
//! - **Stats** (`GET /stats`): active connection count, local or cluster-wide
//!
//! ## Features
//!
//! - **`redis`** (default): cluster-wide counting through a Redis backed
//!   [`SharedCounter`](wsfleet_counter::SharedCounter)

pub mod cluster;
pub mod runtime;
pub mod websocket;

// Re-export main types for public API
pub use cluster::{ClusterController, ControllerExit, WORKER_INDEX_ENV, WorkerCommand, worker_count};
pub use runtime::*;
pub use websocket::{
    ConnectionHandle, ConnectionId, ConnectionRegistry, ConnectionSnapshot, ConnectionState,
    ConnectionTracker, WebSocketConfig, WsError,
};
pub use wsfleet_counter as counter;
