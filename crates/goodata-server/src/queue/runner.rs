//! Queue runner: claims jobs, executes workers in bounded slots, applies
//! retry schedules and drives periodic jobs.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use sqlx::PgPool;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::worker::AnyWorker;
use super::{JobArgs, JobRow, NewJob, Queue, QueueError, Worker, JOB_COLUMNS};

/// How long the runner waits for in-flight jobs at shutdown before
/// abandoning them. Jobs are cancelled, not drained.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Terminal jobs are kept this long for introspection before the
/// maintenance sweep deletes them. Orchestrator waits rely on cancelled
/// rows staying visible, so this must stay at a day or more.
const TERMINAL_RETENTION_HOURS: i64 = 24;

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// A job inserted on a cron schedule, identified by a stable unique key so
/// at most one non-terminal instance exists at a time.
pub struct PeriodicJob {
    id: &'static str,
    schedule: Schedule,
    job: NewJob,
    run_on_start: bool,
}

impl PeriodicJob {
    pub fn new<A: JobArgs>(
        id: &'static str,
        schedule: &str,
        args: &A,
        run_on_start: bool,
    ) -> Result<Self, QueueError> {
        let schedule =
            Schedule::from_str(schedule).map_err(|e| QueueError::Schedule(e.to_string()))?;
        let job = NewJob::new(args)?.with_unique_key(id);

        Ok(Self {
            id,
            schedule,
            job,
            run_on_start,
        })
    }
}

/// Executes jobs from the queue until its cancellation token fires.
pub struct Runner {
    queue: Queue,
    workers: HashMap<&'static str, Arc<dyn AnyWorker>>,
    periodic: Vec<PeriodicJob>,
    max_workers: usize,
    poll_interval: Duration,
}

impl Runner {
    pub fn new(queue: Queue) -> Self {
        Self {
            queue,
            workers: HashMap::new(),
            periodic: Vec::new(),
            max_workers: 5,
            poll_interval: Duration::from_secs(1),
        }
    }

    /// Register a worker for its args' kind. The latest registration for a
    /// kind wins.
    pub fn register<W: Worker>(mut self, worker: W) -> Self {
        self.workers.insert(W::Args::KIND, Arc::new(worker));
        self
    }

    pub fn add_periodic(mut self, job: PeriodicJob) -> Self {
        self.periodic.push(job);
        self
    }

    /// Concurrent worker slots (shared across all kinds).
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Spawn the runner loop. It exits after `cancel` fires and the
    /// shutdown grace period has passed.
    pub fn start(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    async fn run(self, cancel: CancellationToken) {
        info!(
            workers = self.workers.len(),
            slots = self.max_workers,
            periodic = self.periodic.len(),
            "job runner started"
        );

        if let Err(error) = rescue_stale_jobs(self.queue.pool()).await {
            error!(error = %error, "failed to rescue stale running jobs");
        }

        for periodic in &self.periodic {
            if periodic.run_on_start {
                match self.queue.insert(periodic.job.clone()).await {
                    Ok(Some(id)) => info!(job_id = id, periodic = periodic.id, "scheduled startup run"),
                    Ok(None) => debug!(periodic = periodic.id, "startup run already queued"),
                    Err(error) => error!(error = %error, periodic = periodic.id, "failed to schedule startup run"),
                }
            }
        }

        let mut next_fires: Vec<Option<DateTime<Utc>>> = self
            .periodic
            .iter()
            .map(|p| p.schedule.upcoming(Utc).next())
            .collect();

        let mut maintenance = tokio::time::interval(MAINTENANCE_INTERVAL);
        let mut tasks: JoinSet<()> = JoinSet::new();

        loop {
            self.fire_due_periodic(&mut next_fires).await;

            while tasks.len() < self.max_workers && !cancel.is_cancelled() {
                match self.claim_job().await {
                    Ok(Some(row)) => self.spawn_job(&mut tasks, row, &cancel),
                    Ok(None) => break,
                    Err(error) => {
                        error!(error = %error, "failed to claim job");
                        break;
                    }
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
                _ = maintenance.tick() => {
                    if let Err(error) = delete_expired_jobs(self.queue.pool()).await {
                        warn!(error = %error, "queue maintenance failed");
                    }
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!(
            in_flight = tasks.len(),
            "stopping job runner, cancelling in-flight jobs"
        );

        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }

        if let Err(error) = cancel_running_jobs(self.queue.pool()).await {
            error!(error = %error, "failed to mark cancelled jobs");
        }

        info!("job runner stopped");
    }

    async fn fire_due_periodic(&self, next_fires: &mut [Option<DateTime<Utc>>]) {
        let now = Utc::now();
        for (index, periodic) in self.periodic.iter().enumerate() {
            let Some(due) = next_fires[index] else { continue };
            if due > now {
                continue;
            }

            match self.queue.insert(periodic.job.clone()).await {
                Ok(Some(id)) => info!(job_id = id, periodic = periodic.id, "periodic job scheduled"),
                Ok(None) => debug!(periodic = periodic.id, "periodic job already queued"),
                Err(error) => {
                    error!(error = %error, periodic = periodic.id, "failed to schedule periodic job")
                }
            }

            next_fires[index] = periodic.schedule.upcoming(Utc).next();
        }
    }

    /// Claim the next available job, atomically moving it to `running`.
    async fn claim_job(&self) -> Result<Option<JobRow>, QueueError> {
        let query = format!(
            r#"
            UPDATE jobs SET
                state = 'running',
                attempt = attempt + 1,
                attempted_at = now()
            WHERE id = (
                SELECT id FROM jobs
                WHERE state IN ('available', 'retryable') AND scheduled_at <= now()
                ORDER BY priority, scheduled_at, id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {JOB_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, JobRow>(&query)
            .fetch_optional(self.queue.pool())
            .await?;

        Ok(row)
    }

    fn spawn_job(&self, tasks: &mut JoinSet<()>, row: JobRow, cancel: &CancellationToken) {
        let Some(worker) = self.workers.get(row.kind.as_str()).cloned() else {
            let pool = self.queue.pool().clone();
            let kind = row.kind.clone();
            let id = row.id;
            warn!(job_id = id, kind = %kind, "no worker registered for job kind");
            tasks.spawn(async move {
                if let Err(error) =
                    mark_discarded(&pool, id, &format!("no worker registered for kind: {kind}"))
                        .await
                {
                    error!(error = %error, job_id = id, "failed to discard job");
                }
            });
            return;
        };

        let pool = self.queue.pool().clone();
        let job_cancel = cancel.child_token();

        tasks.spawn(async move {
            debug!(job_id = row.id, kind = %row.kind, attempt = row.attempt, "job started");

            let outcome =
                tokio::time::timeout(worker.timeout(), worker.run(row.clone(), job_cancel.clone()))
                    .await;

            let result = match outcome {
                Ok(Ok(())) => mark_completed(&pool, row.id).await,
                Ok(Err(error)) => {
                    let message = format!("{error:#}");
                    finalize_failure(&pool, &worker, &row, &job_cancel, &message).await
                }
                Err(_) => {
                    let message = format!(
                        "job timed out after {} seconds",
                        worker.timeout().as_secs()
                    );
                    finalize_failure(&pool, &worker, &row, &job_cancel, &message).await
                }
            };

            if let Err(error) = result {
                error!(error = %error, job_id = row.id, "failed to finalize job");
            }
        });
    }
}

async fn finalize_failure(
    pool: &PgPool,
    worker: &Arc<dyn AnyWorker>,
    row: &JobRow,
    job_cancel: &CancellationToken,
    message: &str,
) -> Result<(), QueueError> {
    if job_cancel.is_cancelled() {
        warn!(job_id = row.id, kind = %row.kind, "job cancelled");
        return mark_cancelled(pool, row.id, message).await;
    }

    if row.attempt >= row.max_attempts {
        error!(
            job_id = row.id,
            kind = %row.kind,
            attempt = row.attempt,
            error = message,
            "job discarded after max attempts"
        );
        return mark_discarded(pool, row.id, message).await;
    }

    let delay = worker.next_retry(row.attempt);
    let scheduled_at = Utc::now()
        + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::hours(1));
    warn!(
        job_id = row.id,
        kind = %row.kind,
        attempt = row.attempt,
        retry_in_secs = delay.as_secs(),
        error = message,
        "job failed, will retry"
    );
    mark_retryable(pool, row.id, scheduled_at, message).await
}

async fn mark_completed(pool: &PgPool, id: i64) -> Result<(), QueueError> {
    sqlx::query("UPDATE jobs SET state = 'completed', finalized_at = now() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    debug!(job_id = id, "job completed");
    Ok(())
}

async fn mark_retryable(
    pool: &PgPool,
    id: i64,
    scheduled_at: DateTime<Utc>,
    message: &str,
) -> Result<(), QueueError> {
    sqlx::query(
        "UPDATE jobs SET state = 'retryable', scheduled_at = $2, last_error = $3 WHERE id = $1",
    )
    .bind(id)
    .bind(scheduled_at)
    .bind(message)
    .execute(pool)
    .await?;
    Ok(())
}

async fn mark_discarded(pool: &PgPool, id: i64, message: &str) -> Result<(), QueueError> {
    sqlx::query(
        "UPDATE jobs SET state = 'discarded', finalized_at = now(), last_error = $2 WHERE id = $1",
    )
    .bind(id)
    .bind(message)
    .execute(pool)
    .await?;
    Ok(())
}

async fn mark_cancelled(pool: &PgPool, id: i64, message: &str) -> Result<(), QueueError> {
    sqlx::query(
        "UPDATE jobs SET state = 'cancelled', finalized_at = now(), last_error = $2 WHERE id = $1",
    )
    .bind(id)
    .bind(message)
    .execute(pool)
    .await?;
    Ok(())
}

/// Move jobs stuck in `running` (a previous process died mid-job) back to
/// `retryable`. Safe because only one daemon runs against a database.
async fn rescue_stale_jobs(pool: &PgPool) -> Result<(), QueueError> {
    let result = sqlx::query(
        "UPDATE jobs SET state = 'retryable', scheduled_at = now() WHERE state = 'running'",
    )
    .execute(pool)
    .await?;

    if result.rows_affected() > 0 {
        info!(count = result.rows_affected(), "rescued stale running jobs");
    }
    Ok(())
}

/// Sweep jobs left `running` after the shutdown grace period.
async fn cancel_running_jobs(pool: &PgPool) -> Result<(), QueueError> {
    let result = sqlx::query(
        "UPDATE jobs SET state = 'cancelled', finalized_at = now(), \
         last_error = 'job cancelled during shutdown' WHERE state = 'running'",
    )
    .execute(pool)
    .await?;

    if result.rows_affected() > 0 {
        info!(count = result.rows_affected(), "cancelled in-flight jobs");
    }
    Ok(())
}

/// Delete terminal jobs past their retention window.
async fn delete_expired_jobs(pool: &PgPool) -> Result<(), QueueError> {
    let cutoff = Utc::now() - chrono::Duration::hours(TERMINAL_RETENTION_HOURS);
    let result = sqlx::query(
        "DELETE FROM jobs WHERE state IN ('completed', 'discarded', 'cancelled') \
         AND finalized_at < $1",
    )
    .bind(cutoff)
    .execute(pool)
    .await?;

    if result.rows_affected() > 0 {
        debug!(count = result.rows_affected(), "deleted expired jobs");
    }
    Ok(())
}
