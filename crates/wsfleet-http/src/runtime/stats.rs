//! Active connection statistics
//!
//! Single-process mode answers from the exact local count. Cluster mode can
//! only answer from the shared counter; without one there is no cluster-wide
//! figure to report.

use super::{AppState, error::ErrorBody};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{error, warn};
use wsfleet_counter::CounterError;

/// `{activeConnections}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsBody {
    #[serde(rename = "activeConnections")]
    pub active_connections: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatsOutcome {
    Count(i64),
    /// The shared counter could not be read; never reported as zero
    ReadFailed(CounterError),
    /// Cluster mode without the shared counter
    Unsupported,
}

impl IntoResponse for StatsOutcome {
    fn into_response(self) -> Response {
        match self {
            Self::Count(active_connections) => Json(StatsBody { active_connections }).into_response(),
            Self::ReadFailed(_) => ErrorBody::new(StatusCode::INTERNAL_SERVER_ERROR)
                .with_msg("Unable to fetch active connection count")
                .into_response(),
            Self::Unsupported => ErrorBody::new(StatusCode::METHOD_NOT_ALLOWED).into_response(),
        }
    }
}

/// Resolve the active connection count for the current mode
pub async fn active_connections(state: &AppState) -> StatsOutcome {
    let counters = state.tracker.counters();
    if !state.config.cluster.enabled {
        return StatsOutcome::Count(counters.local());
    }

    let Some(shared) = counters.shared() else {
        return StatsOutcome::Unsupported;
    };

    match shared.read().await {
        // an absent key means nothing was ever counted
        Ok(None) => StatsOutcome::Count(0),
        // a lost increment lets DECRBY drive the key below zero
        Ok(Some(value)) if value < 0 => {
            warn!(key = %shared.key(), value, "Shared connection count is negative, reporting 0");
            StatsOutcome::Count(0)
        }
        Ok(Some(value)) => StatsOutcome::Count(value),
        Err(e) => {
            error!(key = %shared.key(), error = %e, "Unable to fetch active connection count");
            StatsOutcome::ReadFailed(e)
        }
    }
}

/// `GET /stats`
pub async fn stats_handler(State(state): State<AppState>) -> StatsOutcome {
    active_connections(&state).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ServerConfigBuilder;
    use std::sync::Arc;
    use wsfleet_counter::{InMemoryCounter, SharedCounter};

    fn clustered() -> crate::runtime::ServerConfig {
        ServerConfigBuilder::new()
            .cluster_enabled(true)
            .cache_enabled(true)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn single_process_reports_local_count() {
        let state = AppState::new(ServerConfigBuilder::new().build().unwrap(), None);
        state.tracker.counters().record(1);
        state.tracker.counters().record(1);
        assert_eq!(active_connections(&state).await, StatsOutcome::Count(2));
    }

    #[tokio::test]
    async fn cluster_without_cache_is_unsupported() {
        let config = ServerConfigBuilder::new()
            .cluster_enabled(true)
            .build()
            .unwrap();
        let state = AppState::new(config, None);
        assert_eq!(active_connections(&state).await, StatsOutcome::Unsupported);
    }

    #[tokio::test]
    async fn absent_shared_key_reads_zero() {
        let shared = Arc::new(InMemoryCounter::new());
        let state = AppState::new(clustered(), Some(shared as Arc<dyn SharedCounter>));
        assert_eq!(active_connections(&state).await, StatsOutcome::Count(0));
    }

    #[tokio::test]
    async fn negative_shared_count_is_reported_as_zero() {
        let shared = Arc::new(InMemoryCounter::new());
        shared.reset().await.unwrap();
        // decrement whose matching increment was lost
        assert!(shared.adjust(-1).await.is_applied());
        assert_eq!(shared.read().await.unwrap(), Some(-1));

        let state = AppState::new(clustered(), Some(shared as Arc<dyn SharedCounter>));
        assert_eq!(active_connections(&state).await, StatsOutcome::Count(0));
    }

    #[tokio::test]
    async fn shared_read_failure_is_not_zero() {
        let shared = Arc::new(InMemoryCounter::new());
        shared.reset().await.unwrap();
        shared.set_available(false);
        let state = AppState::new(clustered(), Some(shared as Arc<dyn SharedCounter>));

        let outcome = active_connections(&state).await;
        assert!(matches!(outcome, StatsOutcome::ReadFailed(_)));
        assert_eq!(
            outcome.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
