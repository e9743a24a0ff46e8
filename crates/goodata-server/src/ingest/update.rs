//! Update orchestrator: the periodic job that drives a whole refresh.
//!
//! The catalog publishes one package per day; checking the two newest
//! covers a missed run. Resources already present in the local metadata
//! table were imported by an earlier run and are skipped, which is what
//! makes re-runs idempotent and forward progress monotone — a failed run
//! retries and rediscovers only what is still missing.
//!
//! Imports are sequenced in four dependency tiers. The queue itself has no
//! notion of job dependencies, so the tiers are enforced here with wait
//! barriers: every job of tier N reaches a terminal state before tier N+1
//! is enqueued.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::catalog::{Client, Resource};
use crate::db::import_config::import_tier;
use crate::db::resource::get_resource;
use crate::queue::{Job, JobArgs, JobState, NewJob, Queue, Worker};

use super::download::DownloadArgs;
use super::import::ImportArgs;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateArgs {}

impl JobArgs for UpdateArgs {
    const KIND: &'static str = "updates";
}

/// Upstream organization publishing the registry exports.
const ORGANIZATION: &str = "onrc";

/// Number of newest packages to inspect per run.
const PACKAGE_WINDOW: u32 = 2;

/// Cadence of the job-state polling barriers.
const POLL_INTERVAL: Duration = Duration::from_secs(5);

pub struct UpdateWorker {
    catalog: Client,
    pool: PgPool,
    queue: Queue,
}

impl UpdateWorker {
    pub fn new(catalog: Client, pool: PgPool, queue: Queue) -> Self {
        Self {
            catalog,
            pool,
            queue,
        }
    }

    /// Poll the queue until every job in `ids` reaches a terminal state.
    /// Any job ending discarded or cancelled fails the whole run.
    async fn wait_for_jobs(&self, ids: &[i64], cancel: &CancellationToken) -> anyhow::Result<()> {
        let mut pending: HashSet<i64> = ids.iter().copied().collect();
        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        ticker.tick().await;

        while !pending.is_empty() {
            tokio::select! {
                _ = cancel.cancelled() => anyhow::bail!("update check cancelled"),
                _ = ticker.tick() => {}
            }

            let mut completed = Vec::new();
            for &id in &pending {
                let row = self
                    .queue
                    .job_get(id)
                    .await?
                    .ok_or_else(|| anyhow::anyhow!("job {id} disappeared from the queue"))?;

                match row.job_state()? {
                    JobState::Completed => completed.push(id),
                    state @ (JobState::Discarded | JobState::Cancelled) => {
                        error!(job_id = id, state = %state, "job failed");
                        anyhow::bail!("job {id} failed in state {state}");
                    }
                    _ => {}
                }
            }

            for id in completed {
                pending.remove(&id);
            }
            debug!(remaining = pending.len(), "waiting for jobs to complete");
        }

        Ok(())
    }

    /// Enqueue one batch transactionally and wait for it to finish.
    async fn run_batch(&self, jobs: Vec<NewJob>, cancel: &CancellationToken) -> anyhow::Result<Vec<i64>> {
        let mut tx = self.pool.begin().await?;
        let ids = self.queue.insert_many_tx(&mut tx, &jobs).await?;
        tx.commit().await?;

        info!(count = ids.len(), "jobs scheduled");
        self.wait_for_jobs(&ids, cancel).await?;

        Ok(ids)
    }
}

#[async_trait]
impl Worker for UpdateWorker {
    type Args = UpdateArgs;

    fn timeout(&self) -> Duration {
        // A full day's downloads plus imports.
        Duration::from_secs(6 * 60 * 60)
    }

    async fn work(&self, _job: Job<UpdateArgs>, cancel: CancellationToken) -> anyhow::Result<()> {
        info!("starting update check");

        let search = self.catalog.search(ORGANIZATION, PACKAGE_WINDOW).await?;
        info!(packages_found = search.results.len(), "catalog search completed");

        let mut new_resources: Vec<Resource> = Vec::new();
        for package in &search.results {
            debug!(
                package_name = %package.name,
                resource_count = package.resources.len(),
                "processing package"
            );

            for resource in &package.resources {
                if get_resource(&self.pool, resource.id).await?.is_some() {
                    debug!(
                        resource_id = %resource.id,
                        resource_name = %resource.name,
                        "resource already imported"
                    );
                    continue;
                }

                info!(
                    resource_id = %resource.id,
                    resource_name = %resource.name,
                    "found new resource"
                );
                new_resources.push(resource.clone());
            }
        }

        if new_resources.is_empty() {
            info!("update check complete, no new resources found");
            return Ok(());
        }

        info!(
            total_resources = new_resources.len(),
            "starting download phase"
        );
        let downloads = new_resources
            .iter()
            .map(|resource| {
                NewJob::new(&DownloadArgs {
                    resource: resource.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.run_batch(downloads, &cancel).await?;
        info!("all downloads completed");

        info!("starting import phase");
        let tiers = partition_tiers(new_resources);
        for (index, tier) in tiers.into_iter().enumerate() {
            let tier_number = index + 1;
            if tier.is_empty() {
                debug!(tier = tier_number, "skipping empty tier");
                continue;
            }

            info!(tier = tier_number, count = tier.len(), "starting import tier");
            let imports = tier
                .iter()
                .map(|resource| {
                    NewJob::new(&ImportArgs {
                        resource: resource.clone(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            self.run_batch(imports, &cancel).await?;
            info!(tier = tier_number, "import tier completed");
        }

        info!("update check complete");
        Ok(())
    }
}

/// Partition resources into the four import tiers by logical name.
fn partition_tiers(resources: Vec<Resource>) -> [Vec<Resource>; 4] {
    let mut tiers: [Vec<Resource>; 4] = Default::default();
    for resource in resources {
        let tier = import_tier(&resource.name) as usize - 1;
        tiers[tier].push(resource);
    }
    tiers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named_resource(name: &str) -> Resource {
        serde_json::from_value(serde_json::json!({
            "id": uuid::Uuid::new_v4(),
            "package_id": uuid::Uuid::new_v4(),
            "name": name,
            "url": format!("http://localhost:1/{}", name.to_lowercase())
        }))
        .unwrap()
    }

    #[test]
    fn test_partition_tiers() {
        let resources = vec![
            named_resource("OD_FIRME.CSV"),
            named_resource("N_VERSIUNE_CAEN.CSV"),
            named_resource("OD_REPREZENTANTI_LEGALI.CSV"),
            named_resource("N_CAEN.CSV"),
            named_resource("N_STARE_FIRMA.CSV"),
            named_resource("OD_SUCURSALE_ALTE_STATE_MEMBRE.CSV"),
        ];

        let tiers = partition_tiers(resources);
        let names = |tier: &[Resource]| tier.iter().map(|r| r.name.clone()).collect::<Vec<_>>();

        assert_eq!(names(&tiers[0]), ["N_VERSIUNE_CAEN.CSV", "N_STARE_FIRMA.CSV"]);
        assert_eq!(names(&tiers[1]), ["N_CAEN.CSV"]);
        assert_eq!(names(&tiers[2]), ["OD_FIRME.CSV"]);
        assert_eq!(
            names(&tiers[3]),
            ["OD_REPREZENTANTI_LEGALI.CSV", "OD_SUCURSALE_ALTE_STATE_MEMBRE.CSV"]
        );
    }

    #[test]
    fn test_unknown_names_fall_into_last_tier() {
        let tiers = partition_tiers(vec![named_resource("OD_RESURSA_NOUA.CSV")]);
        assert!(tiers[0].is_empty());
        assert!(tiers[1].is_empty());
        assert!(tiers[2].is_empty());
        assert_eq!(tiers[3].len(), 1);
    }

    #[test]
    fn test_update_args_encode_to_empty_object() {
        let encoded = serde_json::to_value(UpdateArgs {}).unwrap();
        assert_eq!(encoded, serde_json::json!({}));
    }
}
