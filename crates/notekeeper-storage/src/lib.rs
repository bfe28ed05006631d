//! # notekeeper-storage
//!
//! Storage backends for notekeeper.
//!
//! This crate provides:
//! - Connection pool management
//! - A PostgreSQL visibility-timeout message queue
//! - Note existence lookups
//! - A filesystem blob store with atomic writes
//! - In-memory implementations of every collaborator trait for tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use notekeeper_storage::{Database, FilesystemBlobStore};
//!
//! let db = Database::connect("postgres://localhost/notekeeper").await?;
//! db.migrate().await?;
//! let queue = db.queue("attachment-zip-requests");
//! let blobs = FilesystemBlobStore::new("/var/lib/notekeeper/blobs");
//! ```

pub mod blob_store;
pub mod memory;
pub mod notes;
pub mod pool;
pub mod queue;

// Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use notekeeper_core::*;

pub use blob_store::FilesystemBlobStore;
pub use memory::{InMemoryBlobStore, InMemoryNotes, InMemoryQueue};
pub use notes::PgNoteLookup;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use queue::PgMessageQueue;

/// Combined database context.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Note existence lookups.
    pub notes: PgNoteLookup,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            notes: PgNoteLookup::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Queue handle bound to `name`, sharing this pool.
    pub fn queue(&self, name: &str) -> PgMessageQueue {
        PgMessageQueue::new(self.pool.clone(), name)
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
