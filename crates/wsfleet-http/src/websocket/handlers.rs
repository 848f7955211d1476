//! WebSocket upgrade handler and per-connection event loop

use super::{
    ConnectionHandle, ConnectionId, ConnectionIdAllocator, Outbound, WsError,
    heartbeat::{self, HeartbeatPayload},
    protocol::{self, DigestReply},
};
use crate::runtime::{
    AppState,
    error::{ErrorBody, fallback_handler},
};
use axum::{
    extract::{
        Query, State,
        rejection::QueryRejection,
        ws::{
            CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade, close_code,
            rejection::WebSocketUpgradeRejection,
        },
    },
    http::{HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::ops::ControlFlow;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Response header carrying the identifier assigned to the connection
pub const CONNECTION_ID_HEADER: &str = "x-ws-id";

/// WebSocket upgrade query parameters
#[derive(Debug, Default, Deserialize)]
pub struct WsUpgradeQuery {
    /// Identifier proposed by the peer
    #[serde(rename = "wsId")]
    pub ws_id: Option<String>,
}

/// WebSocket upgrade handler
///
/// A plain HTTP request on the upgrade path is treated as an unknown route.
pub async fn websocket_upgrade_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<AppState>,
    query: Result<Query<WsUpgradeQuery>, QueryRejection>,
    uri: Uri,
) -> Response {
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            debug!(error = %rejection, "Request on the upgrade path is not a WebSocket handshake");
            return fallback_handler(uri).await.into_response();
        }
    };

    let id = match connection_id(query, &state.ids) {
        Ok(id) => id,
        Err(body) => return body.into_response(),
    };

    let limit = state.config.websocket.transport_frame_limit();
    let header = HeaderValue::from_str(id.as_str()).ok();
    let failed_id = id.clone();

    let mut response = ws
        .max_message_size(limit)
        .max_frame_size(limit)
        .on_failed_upgrade(move |e| {
            warn!(connection_id = %failed_id, error = %e, "WebSocket upgrade failed");
        })
        .on_upgrade(move |socket| handle_websocket_connection(socket, id, state));

    if let Some(value) = header {
        response.headers_mut().insert(CONNECTION_ID_HEADER, value);
    }
    response
}

/// Identifier for a new connection: the peer's proposal if valid, else allocated
fn connection_id(
    query: Result<Query<WsUpgradeQuery>, QueryRejection>,
    ids: &ConnectionIdAllocator,
) -> Result<ConnectionId, ErrorBody> {
    let Query(query) = query.map_err(|rejection| {
        warn!(error = %rejection.body_text(), "Rejecting upgrade with malformed query");
        ErrorBody::new(StatusCode::BAD_REQUEST).with_msg(rejection.body_text())
    })?;

    match query.ws_id {
        Some(proposed) if ConnectionId::is_valid(&proposed) => Ok(ConnectionId::new(proposed)),
        Some(proposed) => {
            warn!("Rejecting upgrade with invalid wsId {:?}", proposed);
            Err(ErrorBody::new(StatusCode::BAD_REQUEST)
                .with_msg("Property 'wsId' must be 1-128 characters of [A-Za-z0-9_-]")
                .with_ws_id(proposed))
        }
        None => Ok(ids.allocate()),
    }
}

/// Drive one connection until it closes
async fn handle_websocket_connection(mut socket: WebSocket, id: ConnectionId, state: AppState) {
    let (sender, mut outbound) = mpsc::channel(state.config.websocket.outbound_buffer);
    let handle = ConnectionHandle::new(id.clone(), sender);

    state.tracker.open(handle.clone()).await;
    info!(connection_id = %id, "Client connected");

    let mut heartbeat = heartbeat::ticker(state.config.websocket.heartbeat_interval);

    loop {
        let flow = tokio::select! {
            inbound = socket.recv() => match inbound {
                Some(Ok(message)) => handle_inbound(&mut socket, &state, &id, message).await,
                Some(Err(e)) => {
                    log_transport_error(&id, &WsError::Transport(e.to_string()));
                    ControlFlow::Break(())
                }
                None => ControlFlow::Break(()),
            },
            Some(message) = outbound.recv() => handle_outbound(&mut socket, &id, message).await,
            _ = heartbeat::next_tick(&mut heartbeat) => send_ping(&mut socket, &id).await,
        };

        if flow.is_break() {
            break;
        }
    }

    state.tracker.close(&handle).await;
    info!(connection_id = %id, "Client disconnected");
}

async fn handle_inbound(
    socket: &mut WebSocket,
    state: &AppState,
    id: &ConnectionId,
    message: Message,
) -> ControlFlow<()> {
    match message {
        Message::Text(text) => reply_digest(socket, state, id, text.as_str().as_bytes()).await,
        Message::Binary(bytes) => reply_digest(socket, state, id, &bytes).await,
        Message::Ping(payload) => {
            heartbeat::on_ping(state.registry(), id, &payload).await;
            ControlFlow::Continue(())
        }
        Message::Pong(payload) => {
            heartbeat::on_pong(state.registry(), id, &payload).await;
            ControlFlow::Continue(())
        }
        Message::Close(frame) => {
            state.registry().mark_closing(id.as_str()).await;
            debug!(connection_id = %id, ?frame, "Connection closed by client");
            ControlFlow::Break(())
        }
    }
}

async fn reply_digest(
    socket: &mut WebSocket,
    state: &AppState,
    id: &ConnectionId,
    payload: &[u8],
) -> ControlFlow<()> {
    if let Err(e) = protocol::check_size(payload.len(), state.config.websocket.max_message_size) {
        error!(connection_id = %id, error = %e, "Message is too large to be processed");
        return ControlFlow::Continue(());
    }

    debug!(
        connection_id = %id,
        "[{}] Message received from client : {}",
        std::process::id(),
        String::from_utf8_lossy(payload)
    );

    let reply = DigestReply::for_payload(payload).to_json();
    if let Err(e) = socket.send(Message::Text(reply.into())).await {
        error!(connection_id = %id, error = %e, "Failed to send digest reply");
        return ControlFlow::Break(());
    }
    ControlFlow::Continue(())
}

async fn handle_outbound(
    socket: &mut WebSocket,
    id: &ConnectionId,
    message: Outbound,
) -> ControlFlow<()> {
    match message {
        Outbound::Text(text) => match socket.send(Message::Text(text.into())).await {
            Ok(()) => {
                debug!(connection_id = %id, "Message sent successfully to wsId {}", id);
                ControlFlow::Continue(())
            }
            Err(e) => {
                error!(connection_id = %id, error = %e, "Failed to send msg via connection {}", id);
                ControlFlow::Break(())
            }
        },
        Outbound::Close => {
            let frame = CloseFrame {
                code: close_code::AWAY,
                reason: Utf8Bytes::from_static("server shutting down"),
            };
            if let Err(e) = socket.send(Message::Close(Some(frame))).await {
                debug!(connection_id = %id, error = %e, "Close frame not sent");
            }
            ControlFlow::Break(())
        }
    }
}

async fn send_ping(socket: &mut WebSocket, id: &ConnectionId) -> ControlFlow<()> {
    let payload = HeartbeatPayload::for_connection(id).to_bytes();
    match socket.send(Message::Ping(payload.into())).await {
        Ok(()) => {
            debug!(connection_id = %id, "Server pinged client {}", id);
            ControlFlow::Continue(())
        }
        Err(e) => {
            warn!(connection_id = %id, error = %e, "Heartbeat ping failed");
            ControlFlow::Break(())
        }
    }
}

fn log_transport_error(id: &ConnectionId, error: &WsError) {
    if is_capacity_error(error) {
        error!(
            connection_id = %id,
            error = %error,
            "Message is too large to be processed, transport closed the connection"
        );
    } else {
        debug!(connection_id = %id, error = %error, "Client error");
    }
}

/// Whether a transport error reports an oversized frame or message.
///
/// axum boxes the underlying `tungstenite::Error`, so this matches the display
/// text of `Error::Capacity(CapacityError::MessageTooLong { .. })`
/// ("Space limit exceeded: Message too long: <size> > <max>").
fn is_capacity_error(error: &WsError) -> bool {
    match error {
        WsError::PayloadTooLarge { .. } => true,
        WsError::Transport(detail) => {
            detail.contains("Space limit exceeded") || detail.contains("Message too long")
        }
        _ => false,
    }
}
