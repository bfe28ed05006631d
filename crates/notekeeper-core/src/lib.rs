//! # notekeeper-core
//!
//! Core types, traits, and naming rules for the notekeeper attachment
//! pipeline.
//!
//! This crate provides the foundational data structures and trait definitions
//! that the storage, jobs, and API crates depend on.

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod naming;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use naming::{
    generate_zip_file_id, source_container_name, validate_blob_name, validate_container_name,
    zip_container_name,
};
pub use traits::*;
