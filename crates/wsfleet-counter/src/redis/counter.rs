//! Redis implementation of [`SharedCounter`]

use deadpool_redis::Pool;
use tracing::{debug, info};

use super::{config::RedisCounterConfig, pool::RedisPoolUtils};
use crate::{
    counter::{AdjustOutcome, RetryPolicy, SharedCounter},
    error::{CounterError, CounterResult},
};

/// Shared counter stored as a Redis integer
pub struct RedisCounter {
    pool: Pool,
    key: String,
    policy: RetryPolicy,
}

impl std::fmt::Debug for RedisCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCounter")
            .field("key", &self.key)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RedisCounter {
    /// Build a counter from configuration; the endpoint is dialed lazily
    pub fn new(config: &RedisCounterConfig) -> CounterResult<Self> {
        let pool = RedisPoolUtils::create_pool(config)?;
        debug!(url = %config.url, key = %config.counter_key(), "Created Redis counter pool");
        Ok(Self {
            pool,
            key: config.counter_key(),
            policy: config.policy,
        })
    }

    async fn query<T: redis::FromRedisValue>(&self, cmd: redis::Cmd) -> CounterResult<T> {
        let mut conn = RedisPoolUtils::get_connection(&self.pool).await?;
        cmd.query_async(&mut *conn)
            .await
            .map_err(|e| RedisPoolUtils::classify(&e))
    }
}

#[async_trait::async_trait]
impl SharedCounter for RedisCounter {
    fn key(&self) -> &str {
        &self.key
    }

    fn policy(&self) -> RetryPolicy {
        self.policy
    }

    async fn reset(&self) -> CounterResult<()> {
        let result = self
            .policy
            .run("SET", || {
                let mut cmd = redis::cmd("SET");
                cmd.arg(&self.key).arg(0);
                self.query::<()>(cmd)
            })
            .await;

        match result {
            Ok(((), attempts)) => {
                info!(key = %self.key, attempts, "Initialized active connection count");
                Ok(())
            }
            Err((error, _)) => Err(error),
        }
    }

    async fn adjust(&self, delta: i64) -> AdjustOutcome {
        let (command, magnitude) = if delta < 0 {
            ("DECRBY", delta.unsigned_abs())
        } else {
            ("INCRBY", delta.unsigned_abs())
        };

        let run = self
            .policy
            .run(command, || {
                let mut cmd = redis::cmd(command);
                cmd.arg(&self.key).arg(magnitude);
                self.query::<i64>(cmd)
            })
            .await;

        AdjustOutcome::from_run(&self.key, delta, run)
    }

    async fn read(&self) -> CounterResult<Option<i64>> {
        self.policy
            .run("GET", || {
                let mut cmd = redis::cmd("GET");
                cmd.arg(&self.key);
                self.query::<Option<i64>>(cmd)
            })
            .await
            .map(|(value, _)| value)
            .map_err(|(error, _): (CounterError, u32)| error)
    }
}
