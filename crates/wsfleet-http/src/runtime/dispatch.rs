//! HTTP-to-connection command dispatch
//!
//! `POST /message` hands a payload to a connection owned by this worker. The
//! response only says whether the payload was accepted for delivery; the
//! write itself happens later on the connection task and a failure there is
//! logged, not reported back to the caller.
//!
//! Connections are resolved through a [`ConnectionLocator`]. The only
//! implementation, [`LocalLocator`], sees the registry of the current process,
//! so a connection accepted by a sibling worker is reported as not found.

use super::{AppState, error::ErrorBody};
use crate::websocket::{ConnectionHandle, ConnectionRegistry, WsError};
use async_trait::async_trait;
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const MISSING_ID: &str = "Property 'wsId' is required and should be string";
const NOT_FOUND: &str = "No such connection exists";
const MISSING_MESSAGE: &str = "Property 'msg' is required";
const ACCEPTED: &str = "Message accepted for delivery";
const DELIVERY_FAILED: &str = "Unable to deliver message";

/// Body of `POST /message`
///
/// Both fields are kept as raw JSON so a wrongly typed `wsId` is answered
/// with the missing-id response instead of a deserialization error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageRequest {
    #[serde(rename = "wsId", default)]
    pub ws_id: Option<Value>,
    #[serde(default)]
    pub msg: Option<Value>,
}

/// Resolves a connection identifier to a deliverable handle
#[async_trait]
pub trait ConnectionLocator: Send + Sync {
    async fn locate(&self, id: &str) -> Option<ConnectionHandle>;
}

/// Locator over this process's registry
#[derive(Debug, Clone)]
pub struct LocalLocator {
    registry: Arc<ConnectionRegistry>,
}

impl LocalLocator {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ConnectionLocator for LocalLocator {
    async fn locate(&self, id: &str) -> Option<ConnectionHandle> {
        self.registry.get(id).await
    }
}

/// Informational reply, `{msg, wsId}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchReply {
    pub msg: &'static str,
    #[serde(rename = "wsId", skip_serializing_if = "Option::is_none")]
    pub ws_id: Option<Value>,
}

/// Result of a dispatch attempt
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// `wsId` absent, blank or not a string; checked before any lookup
    MissingId { ws_id: Option<Value> },
    /// No local connection carries the identifier
    NotFound { ws_id: String },
    /// `msg` absent, null or an empty string
    MissingMessage { ws_id: String },
    /// Payload queued on the connection's writer
    Accepted { ws_id: String },
    /// Queue refused the payload synchronously
    DeliveryFailed { ws_id: String, cause: WsError },
}

impl DispatchOutcome {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingId { .. } | Self::NotFound { .. } | Self::Accepted { .. } => {
                StatusCode::OK
            }
            Self::MissingMessage { .. } => StatusCode::BAD_REQUEST,
            Self::DeliveryFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DispatchOutcome {
    fn into_response(self) -> Response {
        match self {
            Self::MissingId { ws_id } => Json(DispatchReply {
                msg: MISSING_ID,
                ws_id,
            })
            .into_response(),
            Self::NotFound { ws_id } => Json(DispatchReply {
                msg: NOT_FOUND,
                ws_id: Some(Value::String(ws_id)),
            })
            .into_response(),
            Self::Accepted { ws_id } => Json(DispatchReply {
                msg: ACCEPTED,
                ws_id: Some(Value::String(ws_id)),
            })
            .into_response(),
            Self::MissingMessage { ws_id } => ErrorBody::new(StatusCode::BAD_REQUEST)
                .with_msg(MISSING_MESSAGE)
                .with_ws_id(ws_id)
                .into_response(),
            Self::DeliveryFailed { ws_id, cause } => {
                ErrorBody::new(StatusCode::INTERNAL_SERVER_ERROR)
                    .with_msg(DELIVERY_FAILED)
                    .with_ws_id(ws_id)
                    .with_cause(cause)
                    .into_response()
            }
        }
    }
}

/// Text sent over the connection for a request payload.
///
/// Strings go out as-is, objects and arrays as JSON text, other scalars in
/// their JSON form. `None` means there is nothing to send.
pub fn encode_payload(msg: &Value) -> Option<String> {
    match msg {
        Value::Null => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

/// Validate a request and hand its payload to the addressed connection
pub async fn dispatch(locator: &dyn ConnectionLocator, request: MessageRequest) -> DispatchOutcome {
    let ws_id = match request.ws_id {
        Some(Value::String(id)) if !id.trim().is_empty() => id,
        other => {
            debug!(ws_id = ?other, "Dispatch request without a usable wsId");
            return DispatchOutcome::MissingId { ws_id: other };
        }
    };

    let Some(handle) = locator.locate(&ws_id).await else {
        info!(connection_id = %ws_id, "No such connection exists");
        return DispatchOutcome::NotFound { ws_id };
    };

    let Some(payload) = request.msg.as_ref().and_then(encode_payload) else {
        return DispatchOutcome::MissingMessage { ws_id };
    };

    match handle.deliver(payload) {
        Ok(()) => {
            debug!(connection_id = %ws_id, "Message accepted for delivery");
            DispatchOutcome::Accepted { ws_id }
        }
        Err(cause) => {
            error!(connection_id = %ws_id, error = %cause, "Failed to send msg via connection");
            DispatchOutcome::DeliveryFailed { ws_id, cause }
        }
    }
}

/// `POST /message`
pub async fn send_message_handler(
    State(state): State<AppState>,
    payload: Result<Json<MessageRequest>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(request)) => dispatch(state.locator.as_ref(), request)
            .await
            .into_response(),
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "Rejected malformed message request");
            ErrorBody::new(StatusCode::BAD_REQUEST)
                .with_msg(rejection.body_text())
                .into_response()
        }
    }
}
