//! Error types and JSON error bodies for the HTTP runtime

use super::config::ConfigError;
use axum::{
    Json,
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;
use std::{io, net::SocketAddr};
use tracing::info;
use wsfleet_counter::CounterError;

/// Fatal process errors; the CLI maps these to a non-zero exit
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("shared counter error: {0}")]
    Counter(#[from] CounterError),

    #[error("failed to spawn worker {index}: {source}")]
    Spawn {
        index: usize,
        #[source]
        source: io::Error,
    },
}

impl ServerError {
    pub(crate) fn bind(addr: impl Into<String>, source: io::Error) -> Self {
        Self::Bind {
            addr: addr.into(),
            source,
        }
    }

    pub(crate) fn bind_socket(addr: SocketAddr, source: io::Error) -> Self {
        Self::bind(addr.to_string(), source)
    }
}

pub type ServerResult<T> = Result<T, ServerError>;

/// JSON error body, `{error, msg?, wsId?, cause?}`
///
/// `error` is the canonical reason phrase of the response status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    #[serde(skip)]
    status: StatusCode,
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(rename = "wsId", skip_serializing_if = "Option::is_none")]
    pub ws_id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl ErrorBody {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            error: status.canonical_reason().unwrap_or("Error"),
            msg: None,
            ws_id: None,
            cause: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn with_msg(mut self, msg: impl Into<String>) -> Self {
        self.msg = Some(msg.into());
        self
    }

    pub fn with_ws_id(mut self, ws_id: impl Into<Value>) -> Self {
        self.ws_id = Some(ws_id.into());
        self
    }

    pub fn with_cause(mut self, cause: impl ToString) -> Self {
        self.cause = Some(cause.to_string());
        self
    }
}

impl IntoResponse for ErrorBody {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// Handler for every path the server does not route
pub async fn fallback_handler(uri: Uri) -> ErrorBody {
    info!("{} is not supported by the server", uri.path());
    ErrorBody::new(StatusCode::NOT_FOUND)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_uses_reason_phrase() {
        let body = ErrorBody::new(StatusCode::BAD_REQUEST)
            .with_msg("Property 'msg' is required")
            .with_ws_id("ws-1-0");
        assert_eq!(body.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "error": "Bad Request",
                "msg": "Property 'msg' is required",
                "wsId": "ws-1-0"
            })
        );
    }

    #[test]
    fn empty_fields_are_omitted() {
        let body = ErrorBody::new(StatusCode::NOT_FOUND);
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({ "error": "Not Found" })
        );
    }
}
