//! Import worker: load one stored file into its target table.
//!
//! Everything — staging, copy, conflict-ignore insert and the resource
//! metadata upsert — happens in a single transaction, so a failed import
//! leaves no trace and the metadata row can never exist without its data.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::catalog::Resource;
use crate::db;
use crate::queue::{Job, JobArgs, Worker};
use crate::store::ResourceStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportArgs {
    pub resource: Resource,
}

impl JobArgs for ImportArgs {
    const KIND: &'static str = "import";
}

const RETRY_SCHEDULE: [Duration; 4] = [
    Duration::from_secs(30),
    Duration::from_secs(2 * 60),
    Duration::from_secs(5 * 60),
    Duration::from_secs(10 * 60),
];

pub struct ImportWorker {
    pool: PgPool,
    store: Arc<dyn ResourceStore>,
}

impl ImportWorker {
    pub fn new(pool: PgPool, store: Arc<dyn ResourceStore>) -> Self {
        Self { pool, store }
    }
}

#[async_trait]
impl Worker for ImportWorker {
    type Args = ImportArgs;

    fn timeout(&self) -> Duration {
        Duration::from_secs(30 * 60)
    }

    fn next_retry(&self, attempt: i32) -> Duration {
        let index = (attempt.max(1) as usize - 1).min(RETRY_SCHEDULE.len() - 1);
        RETRY_SCHEDULE[index]
    }

    async fn work(&self, job: Job<ImportArgs>, _cancel: CancellationToken) -> anyhow::Result<()> {
        let resource = &job.args.resource;

        info!(
            resource_id = %resource.id,
            resource_name = %resource.name,
            attempt = job.attempt,
            "starting import"
        );

        let mut tx = self.pool.begin().await?;

        debug!("loading file from store");
        let data = self.store.open(resource).await?;

        let outcome = db::import::import(&mut tx, resource, BufReader::new(data)).await?;

        debug!("saving resource metadata");
        db::resource::save_resource(&mut *tx, resource).await?;

        tx.commit().await?;

        info!(
            resource_id = %resource.id,
            resource_name = %resource.name,
            rows_inserted = outcome.rows_inserted,
            "import completed"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct UnreadableStore;

    #[async_trait]
    impl ResourceStore for UnreadableStore {
        async fn save(
            &self,
            _resource: &Resource,
            _cancel: &CancellationToken,
        ) -> Result<(), crate::store::StoreError> {
            Ok(())
        }

        async fn open(
            &self,
            _resource: &Resource,
        ) -> Result<Box<dyn tokio::io::AsyncRead + Send + Unpin>, crate::store::StoreError>
        {
            Err(crate::store::StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no such file",
            )))
        }
    }

    #[tokio::test]
    async fn test_retry_schedule_follows_attempts() {
        let pool = PgPool::connect_lazy("postgres://localhost/unreachable").unwrap();
        let worker = ImportWorker::new(pool, Arc::new(UnreadableStore));

        assert_eq!(worker.next_retry(1), Duration::from_secs(30));
        assert_eq!(worker.next_retry(2), Duration::from_secs(2 * 60));
        assert_eq!(worker.next_retry(3), Duration::from_secs(5 * 60));
        assert_eq!(worker.next_retry(4), Duration::from_secs(10 * 60));
        assert_eq!(worker.next_retry(9), Duration::from_secs(10 * 60));
    }

    #[tokio::test]
    async fn test_timeout_is_thirty_minutes() {
        let pool = PgPool::connect_lazy("postgres://localhost/unreachable").unwrap();
        let worker = ImportWorker::new(pool, Arc::new(UnreadableStore));
        assert_eq!(worker.timeout(), Duration::from_secs(1800));
    }
}
