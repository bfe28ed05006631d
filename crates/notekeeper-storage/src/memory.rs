//! In-process implementations of the collaborator traits.
//!
//! Used by unit and integration tests across the workspace. Queue
//! visibility is measured with `tokio::time::Instant`, so tests running on a
//! paused clock can advance past a lease deterministically.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use uuid::Uuid;

use notekeeper_core::{
    validate_blob_name, validate_container_name, BlobItem, BlobMetadata, BlobProperties,
    BlobStore, BlobStream, Error, Lease, LeasedMessage, MessageQueue, NoteLookup, PutOutcome,
    Result,
};

// =============================================================================
// BLOB STORE
// =============================================================================

#[derive(Debug, Clone)]
struct StoredBlob {
    data: Vec<u8>,
    properties: BlobProperties,
}

type Containers = BTreeMap<String, BTreeMap<String, StoredBlob>>;

/// Blob store held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    containers: RwLock<Containers>,
    writes: AtomicUsize,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty container.
    pub async fn create_container(&self, container: &str) -> Result<()> {
        validate_container_name(container).map_err(Error::InvalidInput)?;
        self.containers
            .write()
            .await
            .entry(container.to_string())
            .or_default();
        Ok(())
    }

    /// Raw bytes of a blob, if present.
    pub async fn get(&self, container: &str, name: &str) -> Option<Vec<u8>> {
        self.containers
            .read()
            .await
            .get(container)
            .and_then(|c| c.get(name))
            .map(|b| b.data.clone())
    }

    /// Whether a container exists.
    pub async fn has_container(&self, container: &str) -> bool {
        self.containers.read().await.contains_key(container)
    }

    /// Number of successful `put` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn list(&self, container: &str) -> Result<Option<Vec<BlobItem>>> {
        let guard = self.containers.read().await;
        Ok(guard.get(container).map(|blobs| {
            blobs
                .iter()
                .map(|(name, blob)| BlobItem {
                    name: name.clone(),
                    properties: blob.properties.clone(),
                })
                .collect()
        }))
    }

    async fn open_read(&self, container: &str, name: &str) -> Result<BlobStream> {
        let data = self
            .get(container, name)
            .await
            .ok_or_else(|| Error::NotFound(format!("{container}/{name}")))?;
        Ok(Box::new(std::io::Cursor::new(data)))
    }

    async fn properties(&self, container: &str, name: &str) -> Result<Option<BlobProperties>> {
        Ok(self
            .containers
            .read()
            .await
            .get(container)
            .and_then(|c| c.get(name))
            .map(|b| b.properties.clone()))
    }

    async fn put(
        &self,
        container: &str,
        name: &str,
        data: Vec<u8>,
        content_type: &str,
        metadata: BlobMetadata,
    ) -> Result<PutOutcome> {
        validate_container_name(container).map_err(Error::InvalidInput)?;
        validate_blob_name(name).map_err(Error::InvalidInput)?;

        let now = Utc::now();
        let mut guard = self.containers.write().await;
        let blobs = guard.entry(container.to_string()).or_default();
        let previous = blobs.get(name).map(|b| b.properties.created_on);

        blobs.insert(
            name.to_string(),
            StoredBlob {
                properties: BlobProperties {
                    content_type: content_type.to_string(),
                    content_length: data.len() as u64,
                    created_on: previous.unwrap_or(now),
                    last_modified: now,
                    metadata,
                },
                data,
            },
        );
        self.writes.fetch_add(1, Ordering::SeqCst);

        Ok(if previous.is_some() {
            PutOutcome::Replaced
        } else {
            PutOutcome::Created
        })
    }

    async fn delete(&self, container: &str, name: &str) -> Result<bool> {
        Ok(self
            .containers
            .write()
            .await
            .get_mut(container)
            .and_then(|c| c.remove(name))
            .is_some())
    }

    async fn delete_container(&self, container: &str) -> Result<bool> {
        Ok(self.containers.write().await.remove(container).is_some())
    }
}

// =============================================================================
// QUEUE
// =============================================================================

#[derive(Debug, Clone)]
struct QueueEntry {
    id: Uuid,
    body: String,
    inserted_at: DateTime<Utc>,
    visible_at: Instant,
    pop_receipt: Option<Uuid>,
    dequeue_count: i32,
}

/// Visibility-timeout queue held in memory.
#[derive(Debug)]
pub struct InMemoryQueue {
    name: String,
    entries: Mutex<Vec<QueueEntry>>,
    unavailable: AtomicBool,
}

impl InMemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Mutex::new(Vec::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Make every call fail with `TransportUnavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Bodies of all stored messages in insertion order.
    pub async fn bodies(&self) -> Vec<String> {
        self.entries
            .lock()
            .await
            .iter()
            .map(|e| e.body.clone())
            .collect()
    }

    /// Number of messages receivable right now.
    pub async fn visible_len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .iter()
            .filter(|e| e.visible_at <= now)
            .count()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::TransportUnavailable(format!(
                "queue '{}' is unavailable",
                self.name
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn enqueue(&self, body: &str) -> Result<Uuid> {
        self.check_available()?;
        let id = Uuid::now_v7();
        self.entries.lock().await.push(QueueEntry {
            id,
            body: body.to_string(),
            inserted_at: Utc::now(),
            visible_at: Instant::now(),
            pop_receipt: None,
            dequeue_count: 0,
        });
        Ok(id)
    }

    async fn receive(&self, visibility_timeout: Duration) -> Result<Option<LeasedMessage>> {
        self.check_available()?;
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.iter_mut().find(|e| e.visible_at <= now) else {
            return Ok(None);
        };

        let pop_receipt = Uuid::new_v4();
        entry.visible_at = now + visibility_timeout;
        entry.pop_receipt = Some(pop_receipt);
        entry.dequeue_count += 1;

        let visible_until = Utc::now()
            + chrono::Duration::from_std(visibility_timeout).unwrap_or(chrono::Duration::zero());
        Ok(Some(LeasedMessage {
            lease: Lease {
                message_id: entry.id,
                pop_receipt,
            },
            body: entry.body.clone(),
            dequeue_count: entry.dequeue_count,
            inserted_at: entry.inserted_at,
            visible_until,
        }))
    }

    async fn delete(&self, lease: &Lease) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::QueueDelete(format!(
                "queue '{}' is unavailable",
                self.name
            )));
        }
        let mut entries = self.entries.lock().await;
        let position = entries
            .iter()
            .position(|e| e.id == lease.message_id && e.pop_receipt == Some(lease.pop_receipt))
            .ok_or_else(|| {
                Error::QueueDelete(format!(
                    "message {} is not held by pop receipt {}",
                    lease.message_id, lease.pop_receipt
                ))
            })?;
        entries.remove(position);
        Ok(())
    }

    async fn len(&self) -> Result<u64> {
        self.check_available()?;
        Ok(self.entries.lock().await.len() as u64)
    }
}

// =============================================================================
// NOTES
// =============================================================================

/// Note lookup backed by an in-memory id set.
#[derive(Debug, Default)]
pub struct InMemoryNotes {
    ids: RwLock<HashSet<Uuid>>,
}

impl InMemoryNotes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notes(ids: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            ids: RwLock::new(ids.into_iter().collect()),
        }
    }

    pub async fn insert(&self, note_id: Uuid) {
        self.ids.write().await.insert(note_id);
    }
}

#[async_trait]
impl NoteLookup for InMemoryNotes {
    async fn exists(&self, note_id: Uuid) -> Result<bool> {
        Ok(self.ids.read().await.contains(&note_id))
    }
}
