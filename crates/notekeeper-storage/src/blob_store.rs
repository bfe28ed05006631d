//! Filesystem blob store.
//!
//! Each container is a directory under the base path:
//!
//! ```text
//! {base}/{container}/objects/{k[0..2]}/{key}.blob   record
//! {base}/{container}/staging/{uuid}.tmp            in-flight writes
//! ```
//!
//! `key` is the BLAKE3 hex digest of the blob name, so on-disk file names have
//! a fixed length no matter how long the blob name is. A record holds a 4-byte
//! big-endian header length, a JSON header with the blob name and its
//! [`BlobProperties`], then the content. Records are staged and renamed into
//! place, so content and properties are committed together by one rename.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use notekeeper_core::defaults::STAGING_SWEEP_AGE_SECS;
use notekeeper_core::{
    validate_blob_name, validate_container_name, BlobItem, BlobMetadata, BlobProperties,
    BlobStore, BlobStream, Error, PutOutcome, Result,
};

const OBJECTS_DIR: &str = "objects";
const STAGING_DIR: &str = "staging";
const RECORD_SUFFIX: &str = "blob";

/// Upper bound on a record header; anything larger is a corrupt record.
const MAX_HEADER_BYTES: u32 = 1024 * 1024;

/// Header stored in front of the content of every record.
#[derive(Debug, Serialize, Deserialize)]
struct RecordHeader {
    name: String,
    properties: BlobProperties,
}

/// Header plus the file positioned at the first content byte.
struct OpenRecord {
    file: fs::File,
    header: RecordHeader,
    header_len: u64,
}

/// Blob store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FilesystemBlobStore {
    base_path: PathBuf,
}

impl FilesystemBlobStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Validate that the base directory supports write, read, rename, and
    /// delete, then sweep abandoned staging files. Run once at startup.
    pub async fn validate(&self) -> std::result::Result<(), String> {
        let test_dir = self.base_path.join(".health-check");
        let staged = test_dir.join("test.tmp");
        let final_path = test_dir.join("test.bin");

        fs::create_dir_all(&test_dir)
            .await
            .map_err(|e| format!("create_dir_all({:?}): {}", test_dir, e))?;

        let data = b"blob-store-health-check";
        fs::write(&staged, data)
            .await
            .map_err(|e| format!("write({:?}): {}", staged, e))?;
        fs::rename(&staged, &final_path)
            .await
            .map_err(|e| format!("rename({:?}): {}", final_path, e))?;

        let read_back = fs::read(&final_path)
            .await
            .map_err(|e| format!("read({:?}): {}", final_path, e))?;
        if read_back != data {
            return Err("read-back mismatch".to_string());
        }

        fs::remove_file(&final_path)
            .await
            .map_err(|e| format!("remove_file({:?}): {}", final_path, e))?;
        let _ = fs::remove_dir(&test_dir).await;

        if let Err(e) = self
            .sweep_staging(Duration::from_secs(STAGING_SWEEP_AGE_SECS))
            .await
        {
            warn!(
                subsystem = "storage",
                component = "blob_store",
                error = %e,
                "Staging sweep failed"
            );
        }

        Ok(())
    }

    /// Remove staging files older than `max_age` from every container.
    ///
    /// A write interrupted between create and rename leaves its staging file
    /// behind. Younger files may belong to writes still in flight in another
    /// process and are left alone. Returns the number of files removed.
    pub async fn sweep_staging(&self, max_age: Duration) -> Result<usize> {
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut removed = 0;

        let mut containers = match fs::read_dir(&self.base_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        while let Some(container) = containers.next_entry().await? {
            let mut staged = match fs::read_dir(container.path().join(STAGING_DIR)).await {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            while let Some(entry) = staged.next_entry().await? {
                let metadata = entry.metadata().await?;
                let stale = metadata.is_file()
                    && metadata.modified().map(|m| m <= cutoff).unwrap_or(false);
                if stale && fs::remove_file(entry.path()).await.is_ok() {
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            info!(
                subsystem = "storage",
                component = "blob_store",
                op = "sweep_staging",
                removed,
                "Removed abandoned staging files"
            );
        }
        Ok(removed)
    }

    fn container_path(&self, container: &str) -> Result<PathBuf> {
        validate_container_name(container).map_err(Error::InvalidInput)?;
        Ok(self.base_path.join(container))
    }

    /// On-disk record location for a blob.
    pub fn record_path(&self, container: &str, name: &str) -> Result<PathBuf> {
        let root = self.container_path(container)?;
        validate_blob_name(name).map_err(Error::InvalidInput)?;

        let key = blake3::hash(name.as_bytes()).to_hex();
        Ok(root
            .join(OBJECTS_DIR)
            .join(&key[0..2])
            .join(format!("{}.{}", key.as_str(), RECORD_SUFFIX)))
    }

    async fn read_header(file: &mut fs::File) -> std::io::Result<(RecordHeader, u64)> {
        let len = file.read_u32().await?;
        if len > MAX_HEADER_BYTES {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("record header of {len} bytes exceeds limit"),
            ));
        }
        let mut buf = vec![0u8; len as usize];
        file.read_exact(&mut buf).await?;
        let header = serde_json::from_slice(&buf)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok((header, 4 + u64::from(len)))
    }

    /// Open the record at `path` if it holds the blob `name`.
    async fn open_record(path: &Path, name: &str) -> std::io::Result<Option<OpenRecord>> {
        let mut file = match fs::File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let (header, header_len) = Self::read_header(&mut file).await?;
        if header.name != name {
            // Digest collision; the record belongs to another name.
            return Ok(None);
        }
        Ok(Some(OpenRecord {
            file,
            header,
            header_len,
        }))
    }

    /// Stage `header` and `data` as one record and rename it onto `target`.
    async fn write_record(
        staging_dir: &Path,
        target: &Path,
        header: &[u8],
        data: &[u8],
    ) -> std::io::Result<()> {
        let header_len = u32::try_from(header.len())
            .ok()
            .filter(|len| *len <= MAX_HEADER_BYTES)
            .ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "record header too large")
            })?;

        fs::create_dir_all(staging_dir).await?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = staging_dir.join(format!("{}.tmp", Uuid::new_v4()));
        let mut file = fs::File::create(&temp_path).await?;
        if let Err(e) = async {
            file.write_u32(header_len).await?;
            file.write_all(header).await?;
            file.write_all(data).await?;
            file.sync_all().await
        }
        .await
        {
            drop(file);
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }
        drop(file);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o644)).await?;
        }

        if let Err(e) = fs::rename(&temp_path, target).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }
        Ok(())
    }

    /// Collect every record file under `objects/`.
    async fn record_files(objects_root: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut shards = match fs::read_dir(objects_root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(e.into()),
        };
        while let Some(shard) = shards.next_entry().await? {
            if !shard.file_type().await?.is_dir() {
                continue;
            }
            let mut entries = fs::read_dir(shard.path()).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_file()
                    && path.extension().and_then(|e| e.to_str()) == Some(RECORD_SUFFIX)
                {
                    files.push(path);
                }
            }
        }
        Ok(files)
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn list(&self, container: &str) -> Result<Option<Vec<BlobItem>>> {
        let root = self.container_path(container)?;
        if !fs::try_exists(&root).await? {
            return Ok(None);
        }

        let mut items = Vec::new();
        for path in Self::record_files(&root.join(OBJECTS_DIR)).await? {
            let header = match fs::File::open(&path).await {
                Ok(mut file) => Self::read_header(&mut file).await,
                Err(e) => Err(e),
            };
            match header {
                Ok((header, _)) => items.push(BlobItem {
                    name: header.name,
                    properties: header.properties,
                }),
                // Deleted since the directory scan.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(
                    subsystem = "storage",
                    component = "blob_store",
                    container = %container,
                    path = %path.display(),
                    error = %e,
                    "Skipping unreadable blob record"
                ),
            }
        }
        items.sort_by(|a, b| a.name.cmp(&b.name));

        debug!(
            subsystem = "storage",
            component = "blob_store",
            op = "list",
            container = %container,
            entry_count = items.len(),
            "Listed container"
        );
        Ok(Some(items))
    }

    async fn open_read(&self, container: &str, name: &str) -> Result<BlobStream> {
        let path = self.record_path(container, name)?;
        let read_err = |reason: String| Error::BlobRead {
            container: container.to_string(),
            name: name.to_string(),
            reason,
        };

        let record = Self::open_record(&path, name)
            .await
            .map_err(|e| read_err(e.to_string()))?
            .ok_or_else(|| Error::NotFound(format!("{container}/{name}")))?;

        let content_length = record.header.properties.content_length;
        let on_disk = record
            .file
            .metadata()
            .await
            .map_err(|e| read_err(e.to_string()))?
            .len();
        if on_disk != record.header_len + content_length {
            return Err(read_err(format!(
                "record holds {} content bytes, header says {}",
                on_disk.saturating_sub(record.header_len),
                content_length
            )));
        }

        Ok(Box::new(record.file.take(content_length)))
    }

    async fn properties(&self, container: &str, name: &str) -> Result<Option<BlobProperties>> {
        let path = self.record_path(container, name)?;
        Ok(Self::open_record(&path, name)
            .await?
            .map(|record| record.header.properties))
    }

    async fn put(
        &self,
        container: &str,
        name: &str,
        data: Vec<u8>,
        content_type: &str,
        metadata: BlobMetadata,
    ) -> Result<PutOutcome> {
        let path = self.record_path(container, name)?;
        let staging = self.container_path(container)?.join(STAGING_DIR);

        let previous = match Self::open_record(&path, name).await {
            Ok(record) => record.map(|r| r.header.properties),
            Err(e) => {
                warn!(
                    subsystem = "storage",
                    component = "blob_store",
                    container = %container,
                    blob_name = %name,
                    error = %e,
                    "Overwriting unreadable blob record"
                );
                None
            }
        };

        let now = Utc::now();
        let header = RecordHeader {
            name: name.to_string(),
            properties: BlobProperties {
                content_type: content_type.to_string(),
                content_length: data.len() as u64,
                created_on: previous.as_ref().map(|p| p.created_on).unwrap_or(now),
                last_modified: now,
                metadata,
            },
        };
        let header_bytes = serde_json::to_vec(&header)?;

        Self::write_record(&staging, &path, &header_bytes, &data)
            .await
            .map_err(|e| Error::BlobWrite {
                container: container.to_string(),
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        debug!(
            subsystem = "storage",
            component = "blob_store",
            op = "put",
            container = %container,
            blob_name = %name,
            length = data.len(),
            replaced = previous.is_some(),
            "Blob written"
        );

        Ok(if previous.is_some() {
            PutOutcome::Replaced
        } else {
            PutOutcome::Created
        })
    }

    async fn delete(&self, container: &str, name: &str) -> Result<bool> {
        let path = self.record_path(container, name)?;
        let owned = match Self::open_record(&path, name).await {
            Ok(record) => record.is_some(),
            // A corrupt record under this key is still removable.
            Err(e) => e.kind() != std::io::ErrorKind::NotFound,
        };
        if !owned {
            return Ok(false);
        }

        let existed = match fs::remove_file(&path).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        if let Some(shard) = path.parent() {
            let _ = fs::remove_dir(shard).await;
        }
        Ok(existed)
    }

    async fn delete_container(&self, container: &str) -> Result<bool> {
        let root = self.container_path(container)?;
        match fs::remove_dir_all(&root).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
