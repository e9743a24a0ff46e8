//! Durable Postgres-backed job queue.
//!
//! Jobs are rows in the `jobs` table; claiming uses `FOR UPDATE SKIP
//! LOCKED` so multiple worker slots (or a restarted daemon) never run the
//! same job twice concurrently. Delivery is at-least-once: a job whose
//! completion mark fails is rescued and retried on the next startup.
//!
//! Enqueueing is transactional — `insert_many_tx` rides the caller's
//! transaction, so a batch of jobs becomes visible all at once or not at
//! all.

mod runner;
mod worker;

pub use runner::{PeriodicJob, Runner};
pub use worker::{Job, JobArgs, Worker};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use thiserror::Error;

pub const DEFAULT_PRIORITY: i16 = 1;
pub const DEFAULT_MAX_ATTEMPTS: i32 = 25;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("failed to encode job args: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("unknown job state: {0}")]
    UnknownState(String),

    #[error("invalid cron schedule: {0}")]
    Schedule(String),
}

/// Lifecycle of a job row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Available,
    Running,
    Completed,
    Discarded,
    Cancelled,
    Retryable,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Available => "available",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Discarded => "discarded",
            JobState::Cancelled => "cancelled",
            JobState::Retryable => "retryable",
        }
    }

    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Discarded | JobState::Cancelled
        )
    }
}

impl std::str::FromStr for JobState {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(JobState::Available),
            "running" => Ok(JobState::Running),
            "completed" => Ok(JobState::Completed),
            "discarded" => Ok(JobState::Discarded),
            "cancelled" => Ok(JobState::Cancelled),
            "retryable" => Ok(JobState::Retryable),
            other => Err(QueueError::UnknownState(other.to_string())),
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job row as stored.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobRow {
    pub id: i64,
    pub kind: String,
    pub args: serde_json::Value,
    pub state: String,
    pub priority: i16,
    pub attempt: i32,
    pub max_attempts: i32,
    pub unique_key: Option<String>,
    pub last_error: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub attempted_at: Option<DateTime<Utc>>,
    pub finalized_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl JobRow {
    pub fn job_state(&self) -> Result<JobState, QueueError> {
        self.state.parse()
    }
}

pub(crate) const JOB_COLUMNS: &str = "\
    id, kind, args, state, priority, attempt, max_attempts, unique_key, \
    last_error, scheduled_at, attempted_at, finalized_at, created_at";

/// A job waiting to be enqueued.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub kind: &'static str,
    pub args: serde_json::Value,
    pub priority: i16,
    pub max_attempts: i32,
    pub unique_key: Option<String>,
}

impl NewJob {
    pub fn new<A: JobArgs>(args: &A) -> Result<Self, QueueError> {
        Ok(Self {
            kind: A::KIND,
            args: serde_json::to_value(args)?,
            priority: DEFAULT_PRIORITY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            unique_key: None,
        })
    }

    /// Restrict the job to at most one non-terminal instance per key.
    pub fn with_unique_key(mut self, key: impl Into<String>) -> Self {
        self.unique_key = Some(key.into());
        self
    }
}

/// Queue client: enqueue and introspect jobs. Cheap to clone.
#[derive(Clone)]
pub struct Queue {
    pool: PgPool,
}

impl Queue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Enqueue a batch inside the caller's transaction. Returns the ids of
    /// the inserted jobs; unique-key duplicates are skipped and yield no
    /// id.
    pub async fn insert_many_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        jobs: &[NewJob],
    ) -> Result<Vec<i64>, QueueError> {
        if jobs.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO jobs (kind, args, priority, max_attempts, unique_key) ");
        builder.push_values(jobs, |mut row, job| {
            row.push_bind(job.kind)
                .push_bind(&job.args)
                .push_bind(job.priority)
                .push_bind(job.max_attempts)
                .push_bind(&job.unique_key);
        });
        builder.push(" ON CONFLICT DO NOTHING RETURNING id");

        let ids = builder
            .build_query_scalar::<i64>()
            .fetch_all(&mut **tx)
            .await?;

        Ok(ids)
    }

    /// Enqueue a single job outside any transaction.
    pub async fn insert(&self, job: NewJob) -> Result<Option<i64>, QueueError> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO jobs (kind, args, priority, max_attempts, unique_key) \
             VALUES ($1, $2, $3, $4, $5) ON CONFLICT DO NOTHING RETURNING id",
        )
        .bind(job.kind)
        .bind(&job.args)
        .bind(job.priority)
        .bind(job.max_attempts)
        .bind(&job.unique_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(id)
    }

    /// Look up a job by id.
    pub async fn job_get(&self, id: i64) -> Result<Option<JobRow>, QueueError> {
        let query = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1");
        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    struct TestArgs {
        value: i32,
    }

    impl JobArgs for TestArgs {
        const KIND: &'static str = "test";
    }

    #[test]
    fn test_job_state_round_trip() {
        for state in [
            JobState::Available,
            JobState::Running,
            JobState::Completed,
            JobState::Discarded,
            JobState::Cancelled,
            JobState::Retryable,
        ] {
            assert_eq!(state.as_str().parse::<JobState>().unwrap(), state);
        }
        assert!("pending".parse::<JobState>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Discarded.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
        assert!(!JobState::Available.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(!JobState::Retryable.is_terminal());
    }

    #[test]
    fn test_new_job_encodes_kind_and_args() {
        let job = NewJob::new(&TestArgs { value: 7 }).unwrap();
        assert_eq!(job.kind, "test");
        assert_eq!(job.args, serde_json::json!({"value": 7}));
        assert_eq!(job.priority, DEFAULT_PRIORITY);
        assert_eq!(job.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert!(job.unique_key.is_none());
    }

    #[test]
    fn test_new_job_with_unique_key() {
        let job = NewJob::new(&TestArgs { value: 1 })
            .unwrap()
            .with_unique_key("update-checker");
        assert_eq!(job.unique_key.as_deref(), Some("update-checker"));
    }
}
