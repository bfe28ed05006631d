//! Collaborator traits: blob storage, message queue, and note lookup.
//!
//! Concrete clients are constructed once at startup and injected as
//! `Arc<dyn Trait>` into the producer, the worker, and the HTTP layer.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{BlobItem, BlobMetadata, BlobProperties, Lease, LeasedMessage, PutOutcome};

/// Readable stream over one blob's content.
pub type BlobStream = Box<dyn AsyncRead + Send + Unpin>;

// =============================================================================
// BLOB STORAGE
// =============================================================================

/// Object storage organised into named containers of named blobs.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// List a container's blobs ordered by name.
    ///
    /// Returns `None` when the container does not exist.
    async fn list(&self, container: &str) -> Result<Option<Vec<BlobItem>>>;

    /// Open a blob for reading. Missing blobs are `Error::NotFound`.
    async fn open_read(&self, container: &str, name: &str) -> Result<BlobStream>;

    /// Fetch a blob's properties without reading its content.
    async fn properties(&self, container: &str, name: &str) -> Result<Option<BlobProperties>>;

    /// Write a blob, creating the container if needed and overwriting any
    /// blob of the same name.
    async fn put(
        &self,
        container: &str,
        name: &str,
        data: Vec<u8>,
        content_type: &str,
        metadata: BlobMetadata,
    ) -> Result<PutOutcome>;

    /// Delete a blob. Returns `true` if it existed.
    async fn delete(&self, container: &str, name: &str) -> Result<bool>;

    /// Delete a container and everything in it. Returns `true` if it existed.
    async fn delete_container(&self, container: &str) -> Result<bool>;

    /// Check whether a blob exists.
    async fn exists(&self, container: &str, name: &str) -> Result<bool> {
        Ok(self.properties(container, name).await?.is_some())
    }
}

// =============================================================================
// MESSAGE QUEUE
// =============================================================================

/// At-least-once queue with visibility-timeout leases.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Name of the queue this handle is bound to.
    fn name(&self) -> &str;

    /// Append a message; returns its id once it is durably stored.
    async fn enqueue(&self, body: &str) -> Result<Uuid>;

    /// Lease the next visible message, hiding it for `visibility_timeout`.
    async fn receive(&self, visibility_timeout: Duration) -> Result<Option<LeasedMessage>>;

    /// Remove a leased message. Fails with `Error::QueueDelete` when the lease
    /// is no longer current (expired and re-leased, or already deleted).
    async fn delete(&self, lease: &Lease) -> Result<()>;

    /// Number of messages currently stored, visible or not.
    async fn len(&self) -> Result<u64>;
}

// =============================================================================
// NOTES
// =============================================================================

/// Existence check against the note store owned by the notes service.
#[async_trait]
pub trait NoteLookup: Send + Sync {
    async fn exists(&self, note_id: Uuid) -> Result<bool>;
}
