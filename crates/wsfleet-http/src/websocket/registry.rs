//! Per-process connection registry
//!
//! Maps a [`ConnectionId`] to the handle used to reach the connection's writer.
//! The registry never owns the socket; the connection task does. An entry
//! exists while the connection is OPEN or CLOSING and is removed together with
//! the close event.

use super::{ConnectionId, ConnectionState, Outbound, WsError, WsResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// Non-owning handle to a live connection
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    serial: u64,
    outbound: mpsc::Sender<Outbound>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, outbound: mpsc::Sender<Outbound>) -> Self {
        Self {
            id,
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            outbound,
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Queue a text message for the connection's writer.
    ///
    /// Success means "accepted for delivery"; write failures happen later on
    /// the connection task and are only logged there.
    pub fn deliver(&self, text: String) -> WsResult<()> {
        self.outbound.try_send(Outbound::Text(text)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => WsError::OutboundBufferFull(self.id.clone()),
            mpsc::error::TrySendError::Closed(_) => WsError::ConnectionClosed(self.id.clone()),
        })
    }

    /// Ask the connection task to send a close frame
    pub fn close(&self) -> WsResult<()> {
        self.outbound
            .try_send(Outbound::Close)
            .map_err(|_| WsError::ConnectionClosed(self.id.clone()))
    }

    fn same_connection(&self, other: &ConnectionHandle) -> bool {
        self.serial == other.serial
    }
}

/// Read-only view of a registry entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSnapshot {
    pub id: ConnectionId,
    pub state: ConnectionState,
    pub connected_at: DateTime<Utc>,
    pub last_ping_at: Option<DateTime<Utc>>,
    pub last_pong_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct ConnectionEntry {
    handle: ConnectionHandle,
    state: ConnectionState,
    connected_at: DateTime<Utc>,
    last_ping_at: Option<DateTime<Utc>>,
    last_pong_at: Option<DateTime<Utc>>,
}

impl ConnectionEntry {
    fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            id: self.handle.id.clone(),
            state: self.state,
            connected_at: self.connected_at,
            last_ping_at: self.last_ping_at,
            last_pong_at: self.last_pong_at,
        }
    }
}

/// Identifier → connection mapping owned by one worker process
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, ConnectionEntry>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a connection in the OPEN state.
    ///
    /// Last write wins on identifier collision; the displaced handle is
    /// returned.
    pub async fn register(&self, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let id = handle.id.clone();
        let entry = ConnectionEntry {
            handle,
            state: ConnectionState::Open,
            connected_at: Utc::now(),
            last_ping_at: None,
            last_pong_at: None,
        };

        let displaced = self.connections.write().await.insert(id.clone(), entry);
        if displaced.is_some() {
            warn!(connection_id = %id, "Connection id collision, replacing existing entry");
        }
        displaced.map(|entry| entry.handle)
    }

    /// Remove an entry, reporting whether it existed
    pub async fn unregister(&self, id: &str) -> bool {
        self.connections.write().await.remove(id).is_some()
    }

    /// Remove the entry only if it still belongs to `handle`'s connection.
    ///
    /// Protects a newer connection that took over a colliding id from being
    /// dropped when the older one closes.
    pub async fn unregister_handle(&self, handle: &ConnectionHandle) -> bool {
        let mut connections = self.connections.write().await;
        match connections.get(handle.id.as_str()) {
            Some(entry) if entry.handle.same_connection(handle) => {
                connections.remove(handle.id.as_str());
                true
            }
            Some(_) => {
                debug!(
                    connection_id = %handle.id,
                    "Entry belongs to a newer connection, leaving it in place"
                );
                false
            }
            None => false,
        }
    }

    pub async fn get(&self, id: &str) -> Option<ConnectionHandle> {
        self.connections
            .read()
            .await
            .get(id)
            .map(|entry| entry.handle.clone())
    }

    pub async fn has(&self, id: &str) -> bool {
        self.connections.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    pub async fn snapshot(&self, id: &str) -> Option<ConnectionSnapshot> {
        self.connections
            .read()
            .await
            .get(id)
            .map(ConnectionEntry::snapshot)
    }

    /// Record an inbound ping on the connection
    pub async fn record_ping(&self, id: &str) {
        if let Some(entry) = self.connections.write().await.get_mut(id) {
            entry.last_ping_at = Some(Utc::now());
        }
    }

    /// Record an inbound pong on the connection
    pub async fn record_pong(&self, id: &str) {
        if let Some(entry) = self.connections.write().await.get_mut(id) {
            entry.last_pong_at = Some(Utc::now());
        }
    }

    /// Move an entry to CLOSING, returning whether it was found
    pub async fn mark_closing(&self, id: &str) -> bool {
        match self.connections.write().await.get_mut(id) {
            Some(entry) => {
                entry.state = ConnectionState::Closing;
                true
            }
            None => false,
        }
    }

    /// Ask every registered connection to close. Returns how many were asked.
    pub async fn close_all(&self) -> usize {
        let mut connections = self.connections.write().await;
        let mut asked = 0;
        for entry in connections.values_mut() {
            entry.state = ConnectionState::Closing;
            match entry.handle.close() {
                Ok(()) => asked += 1,
                Err(e) => debug!(connection_id = %entry.handle.id, error = %e, "Close request not queued"),
            }
        }
        asked
    }
}
