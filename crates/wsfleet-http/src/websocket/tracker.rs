//! Connection lifecycle bookkeeping
//!
//! Opening a connection registers it and increments the counters; closing it
//! unregisters and decrements. The local transitions happen synchronously with
//! the event; the shared counter update is spawned and never awaited by the
//! connection path.

use super::{ConnectionHandle, ConnectionRegistry};
use std::{
    sync::{
        Arc,
        atomic::{AtomicI64, AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::{task::JoinHandle, time::Instant};
use tracing::{debug, warn};
use wsfleet_counter::{AdjustOutcome, SharedCounter};

/// Local and (optionally) shared active connection counters
pub struct ConnectionCounters {
    local: AtomicI64,
    shared: Option<Arc<dyn SharedCounter>>,
    pending: Arc<AtomicUsize>,
}

impl std::fmt::Debug for ConnectionCounters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionCounters")
            .field("local", &self.local())
            .field("shared", &self.shared.as_ref().map(|c| c.key().to_string()))
            .field("pending", &self.pending())
            .finish()
    }
}

impl ConnectionCounters {
    /// Counters with no shared cache, for single-process mode
    pub fn local_only() -> Self {
        Self::new(None)
    }

    pub fn new(shared: Option<Arc<dyn SharedCounter>>) -> Self {
        Self {
            local: AtomicI64::new(0),
            shared,
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Exact count of connections open in this process
    pub fn local(&self) -> i64 {
        self.local.load(Ordering::SeqCst)
    }

    pub fn shared(&self) -> Option<&Arc<dyn SharedCounter>> {
        self.shared.as_ref()
    }

    /// Shared counter updates still in flight
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Apply `delta` locally and schedule the shared update.
    ///
    /// The returned handle resolves to the shared outcome; dropping it is the
    /// normal fire-and-forget use.
    pub fn record(&self, delta: i64) -> Option<JoinHandle<AdjustOutcome>> {
        self.local.fetch_add(delta, Ordering::SeqCst);

        let shared = Arc::clone(self.shared.as_ref()?);
        let pending = Arc::clone(&self.pending);
        pending.fetch_add(1, Ordering::SeqCst);

        Some(tokio::spawn(async move {
            let outcome = shared.adjust(delta).await;
            pending.fetch_sub(1, Ordering::SeqCst);
            debug!(delta, outcome = %outcome, "Shared connection count update finished");
            outcome
        }))
    }
}

/// Couples registry membership with the connection counters
#[derive(Debug)]
pub struct ConnectionTracker {
    registry: Arc<ConnectionRegistry>,
    counters: ConnectionCounters,
}

impl ConnectionTracker {
    pub fn new(registry: Arc<ConnectionRegistry>, counters: ConnectionCounters) -> Self {
        Self { registry, counters }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn counters(&self) -> &ConnectionCounters {
        &self.counters
    }

    /// Register a freshly accepted connection and count it
    pub async fn open(&self, handle: ConnectionHandle) -> Option<JoinHandle<AdjustOutcome>> {
        self.registry.register(handle).await;
        self.counters.record(1)
    }

    /// Remove a closed connection and uncount it
    pub async fn close(&self, handle: &ConnectionHandle) -> Option<JoinHandle<AdjustOutcome>> {
        self.registry.unregister_handle(handle).await;
        self.counters.record(-1)
    }

    /// Wait until every connection has gone and shared updates have settled.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.registry.is_empty().await && self.counters.pending() == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                let remaining = self.registry.len().await;
                warn!(
                    remaining,
                    pending_updates = self.counters.pending(),
                    "Connection drain timed out"
                );
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
