//! Download worker: fetch one resource into the store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::catalog::Resource;
use crate::queue::{Job, JobArgs, Worker};
use crate::store::ResourceStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadArgs {
    pub resource: Resource,
}

impl JobArgs for DownloadArgs {
    const KIND: &'static str = "download";
}

/// Downloads are retried patiently: the upstream portal has multi-hour
/// outages, and the resumable store makes retries cheap.
const RETRY_SCHEDULE: [Duration; 5] = [
    Duration::from_secs(60),
    Duration::from_secs(5 * 60),
    Duration::from_secs(15 * 60),
    Duration::from_secs(30 * 60),
    Duration::from_secs(60 * 60),
];

pub struct DownloadWorker {
    store: Arc<dyn ResourceStore>,
}

impl DownloadWorker {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Worker for DownloadWorker {
    type Args = DownloadArgs;

    fn timeout(&self) -> Duration {
        Duration::from_secs(60 * 60)
    }

    fn next_retry(&self, attempt: i32) -> Duration {
        let index = (attempt.max(1) as usize - 1).min(RETRY_SCHEDULE.len() - 1);
        RETRY_SCHEDULE[index]
    }

    async fn work(&self, job: Job<DownloadArgs>, cancel: CancellationToken) -> anyhow::Result<()> {
        let resource = &job.args.resource;

        info!(
            resource_id = %resource.id,
            resource_name = %resource.name,
            url = %resource.url,
            attempt = job.attempt,
            "starting download"
        );

        self.store.save(resource, &cancel).await?;

        info!(
            resource_id = %resource.id,
            resource_name = %resource.name,
            "download completed"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;

    struct FailingStore;

    #[async_trait]
    impl ResourceStore for FailingStore {
        async fn save(
            &self,
            resource: &Resource,
            _cancel: &CancellationToken,
        ) -> Result<(), StoreError> {
            Err(StoreError::InvalidResource(resource.id))
        }

        async fn open(
            &self,
            resource: &Resource,
        ) -> Result<Box<dyn tokio::io::AsyncRead + Send + Unpin>, StoreError> {
            Err(StoreError::InvalidResource(resource.id))
        }
    }

    fn test_resource() -> Resource {
        serde_json::from_value(serde_json::json!({
            "id": "91f0f564-8b3c-40a6-9a14-38b56e266c15",
            "name": "OD_FIRME.CSV",
            "url": "http://localhost:1/od_firme.csv"
        }))
        .unwrap()
    }

    #[test]
    fn test_retry_schedule_follows_attempts() {
        let worker = DownloadWorker::new(Arc::new(FailingStore));
        assert_eq!(worker.next_retry(1), Duration::from_secs(60));
        assert_eq!(worker.next_retry(2), Duration::from_secs(5 * 60));
        assert_eq!(worker.next_retry(3), Duration::from_secs(15 * 60));
        assert_eq!(worker.next_retry(4), Duration::from_secs(30 * 60));
        assert_eq!(worker.next_retry(5), Duration::from_secs(60 * 60));
        // Past the schedule it stays hourly until the attempt cap.
        assert_eq!(worker.next_retry(17), Duration::from_secs(60 * 60));
    }

    #[test]
    fn test_timeout_is_one_hour() {
        let worker = DownloadWorker::new(Arc::new(FailingStore));
        assert_eq!(worker.timeout(), Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_store_errors_propagate_to_queue() {
        let worker = DownloadWorker::new(Arc::new(FailingStore));
        let job = Job {
            id: 1,
            args: DownloadArgs {
                resource: test_resource(),
            },
            attempt: 1,
            priority: 1,
        };

        let result = worker.work(job, CancellationToken::new()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_args_round_trip_through_json() {
        let args = DownloadArgs {
            resource: test_resource(),
        };
        let encoded = serde_json::to_value(&args).unwrap();
        let decoded: DownloadArgs = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded.resource.id, args.resource.id);
        assert_eq!(decoded.resource.name, "OD_FIRME.CSV");
    }
}
