//! HTTP router configuration

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::{
    runtime::{
        AppState, dispatch::send_message_handler, error::fallback_handler, stats::stats_handler,
    },
    websocket::websocket_upgrade_handler,
};

/// Create the worker router
///
/// - `GET /` upgrades to a WebSocket connection
/// - `POST /message` delivers a payload to a local connection
/// - `GET /stats` reports active connections
///
/// Anything else answers `404 {error: "Not Found"}`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(websocket_upgrade_handler))
        .route("/message", post(send_message_handler))
        .route("/stats", get(stats_handler))
        .fallback(fallback_handler)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
