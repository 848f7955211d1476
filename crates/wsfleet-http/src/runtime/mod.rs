//! # Runtime Module
//!
//! Everything one worker process needs to serve HTTP and WebSocket traffic:
//! environment configuration, the shared [`AppState`], the router, listener
//! binding and signal-driven shutdown.

/// Environment-based configuration.
pub mod config;
/// HTTP-to-connection command dispatch.
pub mod dispatch;
/// Fatal errors and JSON error bodies.
pub mod error;
/// Route registration.
pub mod router;
/// Listener binding and the worker serve loop.
pub mod server;
/// Signal handling.
pub mod shutdown;
/// Active connection statistics.
pub mod stats;

pub use config::{CacheConfig, ClusterConfig, ConfigError, ServerConfig, ServerConfigBuilder};
pub use dispatch::{ConnectionLocator, DispatchOutcome, LocalLocator, MessageRequest};
pub use error::{ErrorBody, ServerError, ServerResult};
pub use router::router;
pub use server::{WorkerServer, bind_listener, shared_counter};
pub use shutdown::{ShutdownKind, shutdown_signal};
pub use stats::StatsOutcome;

use crate::websocket::{
    ConnectionCounters, ConnectionIdAllocator, ConnectionRegistry, ConnectionTracker,
};
use std::sync::Arc;
use wsfleet_counter::SharedCounter;

/// State shared by every handler of one worker
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub tracker: Arc<ConnectionTracker>,
    pub locator: Arc<dyn ConnectionLocator>,
    pub ids: Arc<ConnectionIdAllocator>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Build worker state; `shared` is the cluster-wide counter, if any
    pub fn new(config: ServerConfig, shared: Option<Arc<dyn SharedCounter>>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let tracker = Arc::new(ConnectionTracker::new(
            Arc::clone(&registry),
            ConnectionCounters::new(shared),
        ));
        Self {
            config: Arc::new(config),
            tracker,
            locator: Arc::new(LocalLocator::new(registry)),
            ids: Arc::new(ConnectionIdAllocator::default()),
        }
    }

    /// Replace the connection locator used by command dispatch
    pub fn with_locator(mut self, locator: Arc<dyn ConnectionLocator>) -> Self {
        self.locator = locator;
        self
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        self.tracker.registry()
    }
}
