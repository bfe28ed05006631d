//! Centralized default constants for notekeeper.
//!
//! Binaries and `from_env()` constructors fall back to these values when the
//! corresponding environment variable is unset or unparsable.

// =============================================================================
// ZIP PIPELINE
// =============================================================================

/// Queue carrying zip requests from the API to the worker.
pub const ZIP_QUEUE_NAME: &str = "attachment-zip-requests";

/// Sleep between polls when the queue is empty.
pub const ZIP_POLL_INTERVAL_MS: u64 = 5_000;

/// How long a received message stays hidden from other receivers.
pub const ZIP_VISIBILITY_TIMEOUT_SECS: u64 = 30;

/// Processing must finish this long before the lease runs out.
pub const ZIP_LEASE_MARGIN_MS: u64 = 2_000;

/// Dequeue count at which a message is logged as a suspected poison message.
pub const ZIP_POISON_WARN_THRESHOLD: i32 = 5;

/// Suffix appended to a note id to form its zip destination container.
pub const ZIP_CONTAINER_SUFFIX: &str = "-zip";

/// Content type stored on every uploaded archive.
pub const ZIP_CONTENT_TYPE: &str = "application/zip";

/// Read buffer used while copying a blob stream into an archive entry.
pub const ZIP_COPY_BUFFER_BYTES: usize = 64 * 1024;

// =============================================================================
// ATTACHMENTS
// =============================================================================

/// Maximum attachments a single note may hold.
pub const MAX_ATTACHMENTS: usize = 3;

/// Content type recorded when an upload does not declare one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Maximum blob name length in characters.
pub const MAX_BLOB_NAME_LEN: usize = 1024;

/// Maximum `/`-separated segments in a blob name.
pub const MAX_BLOB_PATH_SEGMENTS: usize = 63;

/// Staging files older than this are removed by the startup sweep.
pub const STAGING_SWEEP_AGE_SECS: u64 = 3_600;

/// Largest attachment body the API accepts.
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

// =============================================================================
// HTTP
// =============================================================================

/// Address the API binds to when `HOST` is unset.
pub const API_HOST: &str = "0.0.0.0";

/// Port the API binds to when `PORT` is unset.
pub const API_PORT: u16 = 3000;

// =============================================================================
// EVENTS
// =============================================================================

/// Capacity of the worker event broadcast channel.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// DATABASE
// =============================================================================

/// Database used when `DATABASE_URL` is unset.
pub const DATABASE_URL: &str = "postgres://localhost/notekeeper";

/// Blob storage root used when `BLOB_STORAGE_PATH` is unset.
pub const BLOB_STORAGE_PATH: &str = "/var/lib/notekeeper/blobs";
