//! Shared counter contract and retry policy

use crate::error::{CounterError, CounterResult};
use std::{fmt, future::Future, time::Duration};
use tracing::{debug, error, warn};

/// Cache key holding the cluster-wide active connection count
pub const ACTIVE_CONNECTIONS_KEY: &str = "ws:active-connections";

/// Timeout and retry budget applied to every shared counter operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Upper bound for one attempt
    pub timeout: Duration,
    /// Attempts allowed after the first one fails
    pub retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            retries: 1,
        }
    }
}

impl RetryPolicy {
    /// Total number of attempts this policy allows
    pub fn attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Run `op` under the policy, returning the last error and the attempt
    /// count when every attempt fails.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &'static str,
        mut op: F,
    ) -> Result<(T, u32), (CounterError, u32)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CounterResult<T>>,
    {
        let attempts = self.attempts();
        let mut last_error = CounterError::Unavailable("no attempt made".to_string());

        for attempt in 1..=attempts {
            let result = match tokio::time::timeout(self.timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(CounterError::Timeout {
                    operation,
                    timeout: self.timeout,
                }),
            };

            match result {
                Ok(value) => return Ok((value, attempt)),
                Err(e) => {
                    debug!(operation, attempt, error = %e, "shared counter attempt failed");
                    let transient = e.is_transient();
                    last_error = e;
                    if !transient {
                        return Err((last_error, attempt));
                    }
                }
            }
        }

        Err((last_error, attempts))
    }
}

/// Result of a fire-and-forget counter adjustment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdjustOutcome {
    /// The cache applied the delta and reported the new value
    Applied { value: i64, attempts: u32 },
    /// Every attempt failed; the update is lost and the aggregate drifts
    Degraded { error: CounterError, attempts: u32 },
}

impl AdjustOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    /// Build an outcome from a policy run, logging the degraded case
    pub(crate) fn from_run(
        key: &str,
        delta: i64,
        run: Result<(i64, u32), (CounterError, u32)>,
    ) -> Self {
        match run {
            Ok((value, attempts)) => {
                if attempts > 1 {
                    warn!(key, delta, attempts, "shared counter updated after retry");
                }
                Self::Applied { value, attempts }
            }
            Err((error, attempts)) => {
                error!(
                    key,
                    delta,
                    attempts,
                    error = %error,
                    "Error updating connection count, shared counter degraded"
                );
                Self::Degraded { error, attempts }
            }
        }
    }
}

impl fmt::Display for AdjustOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied { value, attempts } => {
                write!(f, "applied (value={value}, attempts={attempts})")
            }
            Self::Degraded { error, attempts } => {
                write!(f, "degraded after {attempts} attempt(s): {error}")
            }
        }
    }
}

/// Cluster-scoped active connection counter.
///
/// Implementations rely on the backing store's atomic increment; callers must
/// not read-modify-write the value. Adjustments degrade instead of failing:
/// the local view of a connection's state stays authoritative for its process.
#[async_trait::async_trait]
pub trait SharedCounter: Send + Sync {
    /// Fully qualified key the counter lives under
    fn key(&self) -> &str;

    /// Timeout and retry budget this counter applies
    fn policy(&self) -> RetryPolicy;

    /// Set the counter to zero. Called once, before any worker accepts.
    async fn reset(&self) -> CounterResult<()>;

    /// Atomically add `delta` (negative values decrement by magnitude).
    ///
    /// Never returns an error; exhausted retries yield
    /// [`AdjustOutcome::Degraded`] after logging.
    async fn adjust(&self, delta: i64) -> AdjustOutcome;

    /// Current value, `None` when the key is legitimately absent
    async fn read(&self) -> CounterResult<Option<i64>>;
}
