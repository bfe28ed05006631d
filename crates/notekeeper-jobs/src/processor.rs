//! Turns one zip request into one uploaded archive.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, instrument};

use notekeeper_core::defaults::ZIP_CONTENT_TYPE;
use notekeeper_core::{
    source_container_name, zip_container_name, BlobStore, Error, Result, ZipArchiveMetadata,
    ZipRequestMessage,
};

use crate::archive::ArchiveBuilder;

/// Why a request finished without producing an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoOpReason {
    /// The note has no source container.
    SourceMissing,
    /// The source container exists but holds no blobs.
    SourceEmpty,
}

impl fmt::Display for NoOpReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoOpReason::SourceMissing => write!(f, "source container missing"),
            NoOpReason::SourceEmpty => write!(f, "source container empty"),
        }
    }
}

/// Result of one processing attempt.
///
/// `Completed` and `NoOp` both end the request; `Failed` leaves the message
/// for redelivery.
#[derive(Debug)]
pub enum ZipOutcome {
    Completed {
        metadata: ZipArchiveMetadata,
        entry_count: usize,
    },
    NoOp(NoOpReason),
    Failed(Error),
}

impl ZipOutcome {
    /// Whether the queue message should be deleted.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ZipOutcome::Failed(_))
    }
}

/// Lists a note's attachments, zips them, and uploads the archive.
#[derive(Clone)]
pub struct ZipProcessor {
    blobs: Arc<dyn BlobStore>,
}

impl ZipProcessor {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }

    /// Process one request. Never panics on storage errors; they come back as
    /// `ZipOutcome::Failed`.
    #[instrument(
        skip(self, request),
        fields(note_id = %request.note_id, zip_file_id = %request.zip_file_id)
    )]
    pub async fn process(&self, request: &ZipRequestMessage) -> ZipOutcome {
        match self.try_process(request).await {
            Ok(outcome) => outcome,
            Err(e) => ZipOutcome::Failed(e),
        }
    }

    async fn try_process(&self, request: &ZipRequestMessage) -> Result<ZipOutcome> {
        let start = Instant::now();
        let source = source_container_name(request.note_id);

        // Snapshot: blobs added after this listing are not included.
        let items = match self.blobs.list(&source).await? {
            None => {
                debug!(container = %source, "Source container missing, nothing to zip");
                return Ok(ZipOutcome::NoOp(NoOpReason::SourceMissing));
            }
            Some(items) if items.is_empty() => {
                debug!(container = %source, "Source container empty, nothing to zip");
                return Ok(ZipOutcome::NoOp(NoOpReason::SourceEmpty));
            }
            Some(items) => items,
        };

        let mut archive = ArchiveBuilder::new();
        for item in &items {
            let mut stream = self
                .blobs
                .open_read(&source, &item.name)
                .await
                .map_err(|e| match e {
                    Error::NotFound(_) => Error::SourceNotFound(format!(
                        "{}/{} removed after listing",
                        source, item.name
                    )),
                    other => other,
                })?;
            archive.add_entry(&source, &item.name, &mut stream).await?;
        }
        let entry_count = archive.entry_count();
        let bytes = archive.finish()?;

        let destination = zip_container_name(request.note_id);
        let previous_created = self
            .blobs
            .properties(&destination, &request.zip_file_id)
            .await?
            .and_then(|props| ZipArchiveMetadata::from_blob_metadata(&props.metadata))
            .map(|meta| meta.created);

        let metadata = ZipArchiveMetadata::new(
            request.zip_file_id.clone(),
            bytes.len() as u64,
            previous_created,
            Utc::now(),
        );

        self.blobs
            .put(
                &destination,
                &request.zip_file_id,
                bytes,
                ZIP_CONTENT_TYPE,
                metadata.to_blob_metadata(),
            )
            .await
            .map_err(|e| match e {
                e @ Error::BlobWrite { .. } => e,
                other => Error::BlobWrite {
                    container: destination.clone(),
                    name: request.zip_file_id.clone(),
                    reason: other.to_string(),
                },
            })?;

        info!(
            container = %destination,
            entry_count,
            length = metadata.length,
            duration_ms = start.elapsed().as_millis() as u64,
            "Uploaded attachment archive"
        );

        Ok(ZipOutcome::Completed {
            metadata,
            entry_count,
        })
    }
}
