//! Zip request producer used by the HTTP layer.

use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use notekeeper_core::{Error, MessageQueue, Result, ZipRequestMessage};

/// Serializes zip requests onto the queue.
///
/// Does not check that the note exists or has attachments, and does not
/// retry; success means the request is durably queued, not that the archive
/// exists yet.
#[derive(Clone)]
pub struct ZipRequestProducer {
    queue: Arc<dyn MessageQueue>,
}

impl ZipRequestProducer {
    pub fn new(queue: Arc<dyn MessageQueue>) -> Self {
        Self { queue }
    }

    /// Enqueue a request and return the queue message id.
    #[instrument(skip(self), fields(subsystem = "jobs", component = "producer"))]
    pub async fn enqueue(&self, note_id: Uuid, zip_file_id: &str) -> Result<Uuid> {
        let message = ZipRequestMessage::new(note_id, zip_file_id).map_err(|e| match e {
            Error::InvalidMessage(msg) => Error::InvalidInput(msg),
            other => other,
        })?;
        let body = message.encode()?;

        let message_id = self.queue.enqueue(&body).await.map_err(|e| {
            warn!(queue = %self.queue.name(), error = %e, "Failed to enqueue zip request");
            match e {
                e @ Error::TransportUnavailable(_) => e,
                other => Error::TransportUnavailable(other.to_string()),
            }
        })?;

        info!(
            queue = %self.queue.name(),
            message_id = %message_id,
            "Zip request enqueued"
        );
        Ok(message_id)
    }
}
