//! Heartbeat (ping/pong) observation
//!
//! Peers ping with a small JSON payload carrying their identifier; the
//! transport answers with a pong on its own. The server only records and logs
//! liveness. There is no timeout-based disconnect.

use super::{ConnectionId, ConnectionRegistry, WsError, WsResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, warn};

/// Ping/pong payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatPayload {
    #[serde(rename = "wsId")]
    pub ws_id: String,
}

impl HeartbeatPayload {
    pub fn for_connection(id: &ConnectionId) -> Self {
        Self {
            ws_id: id.to_string(),
        }
    }

    pub fn parse(payload: &[u8]) -> WsResult<Self> {
        serde_json::from_slice(payload).map_err(|e| WsError::MalformedHeartbeat(e.to_string()))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        // a struct with one string field always serializes
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// Handle a peer ping. The transport has already queued the pong.
pub async fn on_ping(registry: &ConnectionRegistry, id: &ConnectionId, payload: &[u8]) {
    registry.record_ping(id.as_str()).await;

    match HeartbeatPayload::parse(payload) {
        Ok(heartbeat) => {
            debug!(connection_id = %id, peer_id = %heartbeat.ws_id, "Client {} has pinged", heartbeat.ws_id);
        }
        Err(e) => {
            warn!(connection_id = %id, error = %e, "Ignoring ping with malformed payload");
        }
    }
}

/// Handle a pong answering a server ping
pub async fn on_pong(registry: &ConnectionRegistry, id: &ConnectionId, payload: &[u8]) {
    registry.record_pong(id.as_str()).await;

    match HeartbeatPayload::parse(payload) {
        Ok(heartbeat) => {
            debug!(connection_id = %id, peer_id = %heartbeat.ws_id, "Client {} has ponged", heartbeat.ws_id);
        }
        Err(_) => {
            debug!(connection_id = %id, "Client {} has ponged", id);
        }
    }
}

/// Server-side ping schedule, `None` when disabled
pub fn ticker(interval: Option<Duration>) -> Option<Interval> {
    interval.filter(|d| !d.is_zero()).map(|period| {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    })
}

/// Wait for the next server ping; pends forever when heartbeats are disabled
pub async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
