//! notekeeper HTTP API server.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use notekeeper_api::{router, ApiConfig, AppState};
use notekeeper_core::defaults;
use notekeeper_core::logging::init_tracing;
use notekeeper_jobs::ZipRequestProducer;
use notekeeper_storage::{Database, FilesystemBlobStore, PoolConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let _log_guard = init_tracing(
        "notekeeper_api=info,notekeeper_jobs=info,tower_http=info",
        "notekeeper-api.log",
    );

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| defaults::DATABASE_URL.to_string());
    let blob_path = std::env::var("BLOB_STORAGE_PATH")
        .unwrap_or_else(|_| defaults::BLOB_STORAGE_PATH.to_string());
    let queue_name =
        std::env::var("ZIP_QUEUE_NAME").unwrap_or_else(|_| defaults::ZIP_QUEUE_NAME.to_string());
    let host = std::env::var("HOST").unwrap_or_else(|_| defaults::API_HOST.to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(defaults::API_PORT);
    let config = ApiConfig::from_env();

    let db = Database::connect_with_config(&database_url, PoolConfig::from_env())
        .await
        .context("Failed to connect to database")?;
    db.migrate().await.context("Failed to run migrations")?;

    let blobs = FilesystemBlobStore::new(&blob_path);
    blobs
        .validate()
        .await
        .map_err(|e| anyhow::anyhow!("Blob storage at {blob_path} is not usable: {e}"))?;

    info!(
        blob_path = %blob_path,
        queue = %queue_name,
        max_attachments = config.max_attachments,
        public_base_url = ?config.public_base_url,
        "API configuration loaded"
    );

    let state = AppState {
        blobs: Arc::new(blobs),
        notes: Arc::new(db.notes.clone()),
        zip_producer: ZipRequestProducer::new(Arc::new(db.queue(&queue_name))),
        config,
    };
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("notekeeper API exited");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
