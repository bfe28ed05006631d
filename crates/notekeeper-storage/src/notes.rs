//! Note existence lookups.

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use notekeeper_core::{NoteLookup, Result};

use crate::pool::map_transport_error;

/// PostgreSQL implementation of [`NoteLookup`].
#[derive(Clone)]
pub struct PgNoteLookup {
    pool: Pool<Postgres>,
}

impl PgNoteLookup {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Register a note id. Used by tests and local seeding; the notes service
    /// owns this table in production.
    pub async fn insert(&self, note_id: Uuid) -> Result<()> {
        sqlx::query("INSERT INTO note (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
            .bind(note_id)
            .execute(&self.pool)
            .await
            .map_err(map_transport_error)?;
        Ok(())
    }
}

#[async_trait]
impl NoteLookup for PgNoteLookup {
    async fn exists(&self, note_id: Uuid) -> Result<bool> {
        let row: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM note WHERE id = $1)")
            .bind(note_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_transport_error)?;
        Ok(row.0)
    }
}
