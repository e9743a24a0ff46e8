//! Ingestion workers and queue assembly.
//!
//! Three job kinds drive the pipeline:
//!
//! - `updates` — the periodic orchestrator: diffs the catalog against
//!   imported resources, fans out downloads, then imports tier by tier.
//! - `download` — fetch one resource into the on-disk store, resumable.
//! - `import` — load one stored file into its target table.

mod download;
mod import;
mod update;

use std::sync::Arc;

use anyhow::Result;
use sqlx::PgPool;

use crate::catalog;
use crate::queue::{PeriodicJob, Queue, Runner};
use crate::store::ResourceStore;

pub use download::{DownloadArgs, DownloadWorker};
pub use import::{ImportArgs, ImportWorker};
pub use update::{UpdateArgs, UpdateWorker};

/// Worker slots on the default queue; sized for the download fan-out.
pub const MAX_QUEUE_WORKERS: usize = 5;

/// The update check fires at midnight and once at startup.
pub const UPDATE_SCHEDULE: &str = "0 0 0 * * *";
pub const UPDATE_CHECKER_ID: &str = "update-checker";

/// Build the queue client and a fully registered runner.
pub fn runner(pool: PgPool, store: Arc<dyn ResourceStore>) -> Result<(Queue, Runner)> {
    let queue = Queue::new(pool.clone());

    let catalog = catalog::Client::new()?;
    let update_worker = UpdateWorker::new(catalog, pool.clone(), queue.clone());
    let download_worker = DownloadWorker::new(store.clone());
    let import_worker = ImportWorker::new(pool, store);

    let periodic = PeriodicJob::new(UPDATE_CHECKER_ID, UPDATE_SCHEDULE, &UpdateArgs {}, true)?;

    let runner = Runner::new(queue.clone())
        .with_max_workers(MAX_QUEUE_WORKERS)
        .register(update_worker)
        .register(download_worker)
        .register(import_worker)
        .add_periodic(periodic);

    Ok((queue, runner))
}
