//! notekeeper zip worker binary.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;
use tracing::info;

use notekeeper_core::defaults;
use notekeeper_core::logging::init_tracing;
use notekeeper_jobs::{WorkerBuilder, WorkerConfig, WorkerEvent};
use notekeeper_storage::{Database, FilesystemBlobStore, PoolConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let _log_guard = init_tracing(
        "notekeeper_jobs=info,notekeeper_storage=info",
        "notekeeper-worker.log",
    );

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| defaults::DATABASE_URL.to_string());
    let blob_path = std::env::var("BLOB_STORAGE_PATH")
        .unwrap_or_else(|_| defaults::BLOB_STORAGE_PATH.to_string());
    let queue_name =
        std::env::var("ZIP_QUEUE_NAME").unwrap_or_else(|_| defaults::ZIP_QUEUE_NAME.to_string());
    let config = WorkerConfig::from_env();

    info!(
        blob_path = %blob_path,
        queue = %queue_name,
        enabled = config.enabled,
        "Starting notekeeper zip worker"
    );

    let db = Database::connect_with_config(&database_url, PoolConfig::from_env())
        .await
        .context("Failed to connect to database")?;
    db.migrate().await.context("Failed to run migrations")?;

    let blobs = FilesystemBlobStore::new(&blob_path);
    blobs
        .validate()
        .await
        .map_err(|e| anyhow::anyhow!("Blob storage at {blob_path} is not usable: {e}"))?;

    let worker = WorkerBuilder::new(Arc::new(db.queue(&queue_name)), Arc::new(blobs))
        .with_config(config)
        .build()?;
    let handle = worker.start();

    let mut events = handle.events();
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            info!("Shutdown signal received");
        }
        // A disabled worker exits immediately; nothing left to wait for.
        _ = async {
            loop {
                match events.recv().await {
                    Ok(WorkerEvent::WorkerStopped) | Err(RecvError::Closed) => break,
                    _ => {}
                }
            }
        } => {}
    }

    handle.shutdown().await?;
    info!("notekeeper zip worker exited");
    Ok(())
}
