//! Error types for notekeeper.

use thiserror::Error;

/// Result type alias using notekeeper's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for notekeeper operations.
///
/// The zip pipeline variants (`TransportUnavailable` through `LeaseExpired`)
/// classify where an attempt broke down; the worker logs them and leaves the
/// message for redelivery unless stated otherwise.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Note not found
    #[error("Note not found: {0}")]
    NoteNotFound(uuid::Uuid),

    /// Queue or blob store could not be reached
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    /// Queue body did not deserialize
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Queue body deserialized but failed field validation
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Source container or blob absent
    #[error("Source not found: {0}")]
    SourceNotFound(String),

    /// Reading a source blob failed mid-pipeline
    #[error("Blob read failed for {container}/{name}: {reason}")]
    BlobRead {
        container: String,
        name: String,
        reason: String,
    },

    /// Writing a blob failed
    #[error("Blob write failed for {container}/{name}: {reason}")]
    BlobWrite {
        container: String,
        name: String,
        reason: String,
    },

    /// Building the zip archive failed
    #[error("Archive error: {0}")]
    Archive(String),

    /// Deleting a processed message failed (lease lost or transport error)
    #[error("Queue delete failed: {0}")]
    QueueDelete(String),

    /// The processing deadline derived from the lease ran out
    #[error("Lease expired after {0}ms")]
    LeaseExpired(u64),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether redelivering the same message could ever succeed.
    ///
    /// Malformed and invalid bodies are permanent; everything else may be a
    /// transient fault.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Error::MalformedMessage(_) | Error::InvalidMessage(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
