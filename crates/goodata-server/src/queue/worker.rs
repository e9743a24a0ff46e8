//! Worker traits and the type-erasure glue between typed job args and the
//! stored JSONB payload.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::{JobRow, DEFAULT_MAX_ATTEMPTS};

/// Typed job payload with its kind discriminator.
pub trait JobArgs: Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: &'static str;
}

/// A claimed job handed to a worker.
#[derive(Debug, Clone)]
pub struct Job<A> {
    pub id: i64,
    pub args: A,
    /// 1-based attempt number of this execution.
    pub attempt: i32,
    pub priority: i16,
}

/// A job processor for one kind.
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    type Args: JobArgs;

    /// Wall-clock budget for one attempt; exceeding it counts as a
    /// failure and goes through the retry schedule.
    fn timeout(&self) -> Duration {
        Duration::from_secs(60 * 60)
    }

    fn max_attempts(&self) -> i32 {
        DEFAULT_MAX_ATTEMPTS
    }

    /// Delay before the next attempt, given the 1-based attempt that just
    /// failed. Default: exponential backoff capped at one hour.
    fn next_retry(&self, attempt: i32) -> Duration {
        let exponent = attempt.clamp(1, 12) as u32;
        Duration::from_secs(2u64.saturating_pow(exponent).min(3600))
    }

    async fn work(&self, job: Job<Self::Args>, cancel: CancellationToken) -> anyhow::Result<()>;
}

/// Object-safe view of a [`Worker`], used by the runner's registry.
#[async_trait]
pub(crate) trait AnyWorker: Send + Sync {
    fn timeout(&self) -> Duration;
    fn next_retry(&self, attempt: i32) -> Duration;
    async fn run(&self, row: JobRow, cancel: CancellationToken) -> anyhow::Result<()>;
}

#[async_trait]
impl<W: Worker> AnyWorker for W {
    fn timeout(&self) -> Duration {
        Worker::timeout(self)
    }

    fn next_retry(&self, attempt: i32) -> Duration {
        Worker::next_retry(self, attempt)
    }

    async fn run(&self, row: JobRow, cancel: CancellationToken) -> anyhow::Result<()> {
        let args: W::Args =
            serde_json::from_value(row.args).context("failed to decode job args")?;
        let job = Job {
            id: row.id,
            args,
            attempt: row.attempt,
            priority: row.priority,
        };

        self.work(job, cancel).await
    }
}
