//! WebSocket side of a wsfleet worker
//!
//! Each worker process owns the connections it accepted. This module holds the
//! per-process [`ConnectionRegistry`], the [`ConnectionTracker`] that couples
//! registry membership with the active connection counters, the heartbeat
//! (ping/pong) observation and the digest reply protocol.

use serde::{Deserialize, Serialize};
use std::{
    borrow::Borrow,
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

pub mod handlers;
pub mod heartbeat;
pub mod protocol;
pub mod registry;
pub mod tracker;

pub use handlers::*;
pub use registry::*;
pub use tracker::*;

/// Hard floor for the transport-level frame limit
const MIN_TRANSPORT_FRAME_LIMIT: usize = 64 * 1024;

/// WebSocket configuration
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Inbound message ceiling enforced by the message protocol
    pub max_message_size: usize,
    /// Server-initiated ping interval, `None` leaves liveness to the peer
    pub heartbeat_interval: Option<Duration>,
    /// Capacity of each connection's outbound queue
    pub outbound_buffer: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_message_size: 1024,
            heartbeat_interval: None,
            outbound_buffer: 64,
        }
    }
}

impl WebSocketConfig {
    /// Frame limit handed to the transport.
    ///
    /// Messages between `max_message_size` and this limit are rejected by the
    /// protocol layer and the connection stays open; anything larger makes
    /// the transport close the connection.
    pub fn transport_frame_limit(&self) -> usize {
        self.max_message_size
            .saturating_mul(4)
            .max(MIN_TRANSPORT_FRAME_LIMIT)
    }
}

/// Connection identifier, unique within one worker process
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a peer-proposed identifier is acceptable
    pub fn is_valid(candidate: &str) -> bool {
        !candidate.is_empty()
            && candidate.len() <= 128
            && candidate
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ConnectionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Hands out `ws-<pid>-<index>` identifiers
#[derive(Debug)]
pub struct ConnectionIdAllocator {
    pid: u32,
    next: AtomicU64,
}

impl Default for ConnectionIdAllocator {
    fn default() -> Self {
        Self::for_process(std::process::id())
    }
}

impl ConnectionIdAllocator {
    pub fn for_process(pid: u32) -> Self {
        Self {
            pid,
            next: AtomicU64::new(0),
        }
    }

    pub fn allocate(&self) -> ConnectionId {
        let index = self.next.fetch_add(1, Ordering::Relaxed);
        ConnectionId(format!("ws-{}-{}", self.pid, index))
    }
}

/// Lifecycle state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Open,
    Closing,
    Closed,
}

/// Messages queued for a connection's writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Text frame from the command dispatch path
    Text(String),
    /// Close the connection with a going-away frame
    Close,
}

/// WebSocket-side errors; recovered locally, never forwarded to the peer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WsError {
    #[error("message of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("malformed heartbeat payload: {0}")]
    MalformedHeartbeat(String),

    #[error("connection {0} is closed")]
    ConnectionClosed(ConnectionId),

    #[error("outbound buffer of connection {0} is full")]
    OutboundBufferFull(ConnectionId),

    #[error("transport error: {0}")]
    Transport(String),
}

pub type WsResult<T> = Result<T, WsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_embeds_pid_and_index() {
        let allocator = ConnectionIdAllocator::for_process(4242);
        assert_eq!(allocator.allocate().as_str(), "ws-4242-0");
        assert_eq!(allocator.allocate().as_str(), "ws-4242-1");
    }

    #[test]
    fn connection_id_validation() {
        assert!(ConnectionId::is_valid("ws-1-0"));
        assert!(ConnectionId::is_valid("client_A"));
        assert!(!ConnectionId::is_valid(""));
        assert!(!ConnectionId::is_valid("has space"));
        assert!(!ConnectionId::is_valid("semi;colon"));
        assert!(!ConnectionId::is_valid(&"x".repeat(129)));
    }

    #[test]
    fn transport_limit_has_floor() {
        let config = WebSocketConfig::default();
        assert_eq!(config.transport_frame_limit(), 64 * 1024);

        let config = WebSocketConfig {
            max_message_size: 1024 * 1024,
            ..Default::default()
        };
        assert_eq!(config.transport_frame_limit(), 4 * 1024 * 1024);
    }

    #[test]
    fn state_serializes_upper_case() {
        assert_eq!(
            serde_json::to_string(&ConnectionState::Closing).unwrap(),
            "\"CLOSING\""
        );
    }
}
