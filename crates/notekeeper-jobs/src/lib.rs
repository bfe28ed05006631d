//! # notekeeper-jobs
//!
//! Asynchronous attachment-zip pipeline for notekeeper.
//!
//! This crate provides:
//! - The zip request producer used by the HTTP layer
//! - Deterministic in-memory archive assembly
//! - A processor that lists, zips, and uploads a note's attachments
//! - A lease-aware worker loop with graceful shutdown and broadcast events
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use notekeeper_jobs::{WorkerBuilder, WorkerConfig};
//! use notekeeper_storage::{Database, FilesystemBlobStore};
//!
//! let db = Database::connect("postgres://...").await?;
//! let queue = Arc::new(db.queue("attachment-zip-requests"));
//! let blobs = Arc::new(FilesystemBlobStore::new("/var/lib/notekeeper/blobs"));
//!
//! let worker = WorkerBuilder::new(queue, blobs)
//!     .with_config(WorkerConfig::from_env())
//!     .build()?;
//! let handle = worker.start();
//!
//! let mut events = handle.events();
//! while let Ok(event) = events.recv().await {
//!     println!("Event: {:?}", event);
//! }
//!
//! handle.shutdown().await?;
//! ```

pub mod archive;
pub mod processor;
pub mod producer;
pub mod worker;

// Re-export core types
pub use notekeeper_core::*;

pub use archive::ArchiveBuilder;
pub use processor::{NoOpReason, ZipOutcome, ZipProcessor};
pub use producer::ZipRequestProducer;
pub use worker::{WorkerBuilder, WorkerConfig, WorkerEvent, WorkerHandle, ZipWorker};
