//! Data models shared by the API, the worker, and the storage backends.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults::ZIP_CONTENT_TYPE;
use crate::error::{Error, Result};
use crate::naming::validate_blob_name;

// =============================================================================
// METADATA KEYS
// =============================================================================

/// Metadata key naming the archive an object holds.
pub const META_ZIP_FILE_ID: &str = "zipFileId";
/// Metadata key for the first upload time.
pub const META_CREATED: &str = "Created";
/// Metadata key for the latest upload time of an archive.
pub const META_LAST_MODIFIED: &str = "LastModified";
/// Metadata key for the latest replacement time of an attachment.
pub const META_MODIFIED: &str = "Modified";
/// Metadata key mirroring the object's content type.
pub const META_CONTENT_TYPE: &str = "ContentType";
/// Metadata key for the byte count, as a decimal string.
pub const META_LENGTH: &str = "Length";
/// Metadata key for the owning note of an attachment.
pub const META_NOTE_ID: &str = "NoteId";
/// Metadata key for the attachment id (same as the blob name).
pub const META_ATTACHMENT_ID: &str = "AttachmentId";

/// Free-form string metadata stored next to a blob.
pub type BlobMetadata = BTreeMap<String, String>;

/// Format a timestamp the way it is stored in blob metadata.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a timestamp previously written by [`format_timestamp`].
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

// =============================================================================
// ZIP REQUEST MESSAGE
// =============================================================================

/// Unit of work carried through the zip request queue.
///
/// Wire form: `{"noteId": "<uuid>", "zipFileId": "<blob name>"}`. The body
/// carries no attempt counter; a redelivered message is indistinguishable
/// from a fresh one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZipRequestMessage {
    /// Note whose attachments are archived.
    pub note_id: Uuid,
    /// Destination object name.
    pub zip_file_id: String,
}

/// Lenient wire shape so that missing fields are reported as invalid rather
/// than malformed.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireZipRequest {
    #[serde(default)]
    note_id: Option<String>,
    #[serde(default)]
    zip_file_id: Option<String>,
}

impl ZipRequestMessage {
    /// Build a message, enforcing the field rules.
    pub fn new(note_id: Uuid, zip_file_id: impl Into<String>) -> Result<Self> {
        let message = Self {
            note_id,
            zip_file_id: zip_file_id.into(),
        };
        message.validate()?;
        Ok(message)
    }

    /// Check the field rules: non-nil note id, legal non-blank zip file id.
    pub fn validate(&self) -> Result<()> {
        if self.note_id.is_nil() {
            return Err(Error::InvalidMessage("noteId cannot be empty".to_string()));
        }
        if self.zip_file_id.trim().is_empty() {
            return Err(Error::InvalidMessage(
                "zipFileId cannot be null or empty".to_string(),
            ));
        }
        validate_blob_name(&self.zip_file_id)
            .map_err(|e| Error::InvalidMessage(format!("zipFileId is not a legal blob name: {e}")))
    }

    /// Serialize to the queue body.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode and validate a queue body.
    ///
    /// Bodies that are not JSON objects, or whose `noteId` is not a UUID, are
    /// [`Error::MalformedMessage`]. Bodies that parse but are missing fields or
    /// break the field rules are [`Error::InvalidMessage`].
    pub fn decode(body: &str) -> Result<Self> {
        let wire: WireZipRequest =
            serde_json::from_str(body).map_err(|e| Error::MalformedMessage(e.to_string()))?;

        let note_id = match wire.note_id.as_deref().map(str::trim) {
            None | Some("") => {
                return Err(Error::InvalidMessage("noteId is required".to_string()));
            }
            Some(raw) => Uuid::parse_str(raw).map_err(|e| {
                Error::MalformedMessage(format!("noteId '{raw}' is not a UUID: {e}"))
            })?,
        };

        let message = Self {
            note_id,
            zip_file_id: wire.zip_file_id.unwrap_or_default(),
        };
        message.validate()?;
        Ok(message)
    }
}

// =============================================================================
// ARCHIVE METADATA
// =============================================================================

/// Metadata recorded on every uploaded archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZipArchiveMetadata {
    pub zip_file_id: String,
    pub created: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub content_type: String,
    pub length: u64,
}

impl ZipArchiveMetadata {
    /// Metadata for an archive of `length` bytes uploaded at `now`.
    ///
    /// `created` carries over the first upload time when the archive is being
    /// rewritten by a redelivered message.
    pub fn new(
        zip_file_id: impl Into<String>,
        length: u64,
        created: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            zip_file_id: zip_file_id.into(),
            created: created.unwrap_or(now),
            last_modified: now,
            content_type: ZIP_CONTENT_TYPE.to_string(),
            length,
        }
    }

    /// Flatten into the string map persisted by the blob store.
    pub fn to_blob_metadata(&self) -> BlobMetadata {
        let mut map = BlobMetadata::new();
        map.insert(META_ZIP_FILE_ID.to_string(), self.zip_file_id.clone());
        map.insert(META_CREATED.to_string(), format_timestamp(self.created));
        map.insert(
            META_LAST_MODIFIED.to_string(),
            format_timestamp(self.last_modified),
        );
        map.insert(META_CONTENT_TYPE.to_string(), self.content_type.clone());
        map.insert(META_LENGTH.to_string(), self.length.to_string());
        map
    }

    /// Rebuild from a stored map; `None` when any key is missing or unparsable.
    pub fn from_blob_metadata(map: &BlobMetadata) -> Option<Self> {
        Some(Self {
            zip_file_id: map.get(META_ZIP_FILE_ID)?.clone(),
            created: parse_timestamp(map.get(META_CREATED)?)?,
            last_modified: parse_timestamp(map.get(META_LAST_MODIFIED)?)?,
            content_type: map.get(META_CONTENT_TYPE)?.clone(),
            length: map.get(META_LENGTH)?.parse().ok()?,
        })
    }
}

// =============================================================================
// BLOB STORE RECORDS
// =============================================================================

/// System properties of a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobProperties {
    pub content_type: String,
    pub content_length: u64,
    pub created_on: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub metadata: BlobMetadata,
}

/// One entry of a container listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobItem {
    pub name: String,
    pub properties: BlobProperties,
}

/// Result of writing a blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// No blob of that name existed before.
    Created,
    /// An existing blob was overwritten.
    Replaced,
}

// =============================================================================
// API VIEWS
// =============================================================================

/// Attachment listing entry returned by the HTTP API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentDetails {
    pub attachment_id: String,
    pub content_type: String,
    pub created_date: DateTime<Utc>,
    pub last_modified_date: DateTime<Utc>,
    pub length: u64,
}

impl From<&BlobItem> for AttachmentDetails {
    fn from(item: &BlobItem) -> Self {
        let props = &item.properties;
        let created_date = props
            .metadata
            .get(META_CREATED)
            .and_then(|s| parse_timestamp(s))
            .unwrap_or(props.created_on);
        Self {
            attachment_id: item.name.clone(),
            content_type: props.content_type.clone(),
            created_date,
            last_modified_date: props.last_modified,
            length: props.content_length,
        }
    }
}

/// Zip archive listing entry returned by the HTTP API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZipFileDetails {
    pub zip_file_id: String,
    pub content_type: String,
    pub created_date: DateTime<Utc>,
    pub last_modified_date: DateTime<Utc>,
    pub length: u64,
}

impl From<&BlobItem> for ZipFileDetails {
    fn from(item: &BlobItem) -> Self {
        let props = &item.properties;
        match ZipArchiveMetadata::from_blob_metadata(&props.metadata) {
            Some(meta) => Self {
                zip_file_id: item.name.clone(),
                content_type: meta.content_type,
                created_date: meta.created,
                last_modified_date: meta.last_modified,
                length: meta.length,
            },
            None => Self {
                zip_file_id: item.name.clone(),
                content_type: props.content_type.clone(),
                created_date: props.created_on,
                last_modified_date: props.last_modified,
                length: props.content_length,
            },
        }
    }
}

// =============================================================================
// QUEUE RECORDS
// =============================================================================

/// Handle proving the current receiver owns a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub message_id: Uuid,
    /// Rotates on every receive; deleting with a stale receipt fails.
    pub pop_receipt: Uuid,
}

/// A message handed out by [`crate::MessageQueue::receive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeasedMessage {
    pub lease: Lease,
    pub body: String,
    /// Number of times the message has been received, this one included.
    pub dequeue_count: i32,
    pub inserted_at: DateTime<Utc>,
    pub visible_until: DateTime<Utc>,
}

impl LeasedMessage {
    pub fn message_id(&self) -> Uuid {
        self.lease.message_id
    }
}
