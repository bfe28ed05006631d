//! In-memory zip assembly.
//!
//! Every entry is written with a fixed modification time and the same deflate
//! settings, so the same inputs in the same order always produce the same
//! bytes. A redelivered request therefore overwrites its destination with an
//! identical archive.

use std::io::{Cursor, Write};

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use notekeeper_core::defaults::ZIP_COPY_BUFFER_BYTES;
use notekeeper_core::{Error, Result};

/// Accumulates entries into a zip archive held in memory.
pub struct ArchiveBuilder {
    writer: ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
    buffer: Vec<u8>,
    entries: usize,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default());
        Self {
            writer: ZipWriter::new(Cursor::new(Vec::new())),
            options,
            buffer: vec![0; ZIP_COPY_BUFFER_BYTES],
            entries: 0,
        }
    }

    /// Number of entries added so far.
    pub fn entry_count(&self) -> usize {
        self.entries
    }

    /// Copy `reader` into a new entry named `name`.
    ///
    /// Read failures are reported as `Error::BlobRead` against
    /// `container`/`name`; zip failures as `Error::Archive`. Either way the
    /// builder should be dropped.
    pub async fn add_entry<R>(&mut self, container: &str, name: &str, reader: &mut R) -> Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        self.writer
            .start_file(name, self.options)
            .map_err(|e| Error::Archive(format!("start entry '{name}': {e}")))?;

        let mut written: u64 = 0;
        loop {
            let n = reader
                .read(&mut self.buffer)
                .await
                .map_err(|e| Error::BlobRead {
                    container: container.to_string(),
                    name: name.to_string(),
                    reason: e.to_string(),
                })?;
            if n == 0 {
                break;
            }
            self.writer
                .write_all(&self.buffer[..n])
                .map_err(|e| Error::Archive(format!("write entry '{name}': {e}")))?;
            written += n as u64;
        }

        self.entries += 1;
        trace!(
            subsystem = "jobs",
            component = "archive",
            blob_name = %name,
            length = written,
            "Archive entry written"
        );
        Ok(written)
    }

    /// Finalise the central directory and return the archive bytes.
    pub fn finish(self) -> Result<Vec<u8>> {
        let cursor = self
            .writer
            .finish()
            .map_err(|e| Error::Archive(format!("finish archive: {e}")))?;
        Ok(cursor.into_inner())
    }
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}
