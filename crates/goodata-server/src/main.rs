//! goodata server — main entry point.

use std::sync::Arc;

use anyhow::{Context, Result};
use goodata_common::logging::init_logging;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use goodata_server::config::Config;
use goodata_server::store::{FsResourceStore, ResourceStore};
use goodata_server::{db, ingest};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    init_logging(&config.log)?;

    info!("starting goodata server");
    if config.telemetry.enabled {
        info!(
            endpoint = %config.telemetry.otel_endpoint,
            service_name = %config.telemetry.service_name,
            service_version = %config.telemetry.service_version,
            "telemetry enabled, exporter is managed externally"
        );
    }

    let pool = db::create_pool(&config.db)
        .await
        .context("failed to create connection pool")?;

    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;
    info!("database migrations completed");

    let store: Arc<dyn ResourceStore> = Arc::new(
        FsResourceStore::new(&config.data_dir).context("failed to create resource store")?,
    );

    let (_queue, runner) =
        ingest::runner(pool.clone(), store).context("failed to build job runner")?;

    let shutdown = CancellationToken::new();
    let runner_handle = runner.start(shutdown.child_token());

    wait_for_signal().await;

    info!("shutting down gracefully");
    shutdown.cancel();

    // The runner cancels in-flight jobs and stops within its own grace
    // window.
    if let Err(error) = runner_handle.await {
        error!(error = %error, "job runner exited abnormally");
    }

    info!("closing database connection pool");
    pool.close().await;

    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            error!(error = %error, "failed to install SIGINT handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                error!(error = %error, "failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT"),
        _ = terminate => info!("received SIGTERM"),
    }
}
