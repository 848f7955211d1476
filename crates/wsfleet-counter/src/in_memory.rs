//! Process-local shared counter
//!
//! Useful for single-host development and for exercising the degrade path:
//! [`InMemoryCounter::set_available`] simulates a cache outage.

use crate::{
    counter::{ACTIVE_CONNECTIONS_KEY, AdjustOutcome, RetryPolicy, SharedCounter},
    error::{CounterError, CounterResult},
};
use std::sync::{
    Mutex,
    atomic::{AtomicBool, Ordering},
};

/// Counter kept in this process's memory
#[derive(Debug)]
pub struct InMemoryCounter {
    value: Mutex<Option<i64>>,
    available: AtomicBool,
    policy: RetryPolicy,
}

impl Default for InMemoryCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCounter {
    /// Create a counter whose key starts out absent
    pub fn new() -> Self {
        Self::with_policy(RetryPolicy::default())
    }

    pub fn with_policy(policy: RetryPolicy) -> Self {
        Self {
            value: Mutex::new(None),
            available: AtomicBool::new(true),
            policy,
        }
    }

    /// Toggle simulated reachability of the backing cache
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> CounterResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CounterError::Unavailable(
                "in-memory counter marked unavailable".to_string(),
            ))
        }
    }

    fn apply(&self, delta: i64) -> CounterResult<i64> {
        self.check_available()?;
        let mut guard = self
            .value
            .lock()
            .map_err(|_| CounterError::Command("counter mutex poisoned".to_string()))?;
        let next = guard.unwrap_or(0).saturating_add(delta);
        *guard = Some(next);
        Ok(next)
    }
}

#[async_trait::async_trait]
impl SharedCounter for InMemoryCounter {
    fn key(&self) -> &str {
        ACTIVE_CONNECTIONS_KEY
    }

    fn policy(&self) -> RetryPolicy {
        self.policy
    }

    async fn reset(&self) -> CounterResult<()> {
        self.check_available()?;
        let mut guard = self
            .value
            .lock()
            .map_err(|_| CounterError::Command("counter mutex poisoned".to_string()))?;
        *guard = Some(0);
        Ok(())
    }

    async fn adjust(&self, delta: i64) -> AdjustOutcome {
        let run = self
            .policy
            .run("INCRBY", || async { self.apply(delta) })
            .await;
        AdjustOutcome::from_run(self.key(), delta, run)
    }

    async fn read(&self) -> CounterResult<Option<i64>> {
        self.check_available()?;
        self.value
            .lock()
            .map(|guard| *guard)
            .map_err(|_| CounterError::Command("counter mutex poisoned".to_string()))
    }
}
