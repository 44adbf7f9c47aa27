//! # dm-files
//!
//! File handling for Documents RS.
//!
//! ## Features
//!
//! - Storage abstraction (local filesystem, in-memory)
//! - File metadata records
//! - Upload validation (size, content type) and optional image optimization
//!
//! ## Example
//!
//! ```rust,ignore
//! use dm_files::{AllowedFileTypes, FileService, MemoryStorage, UploadOptions, UploadedFile};
//! use std::sync::Arc;
//!
//! let service = FileService::new(Arc::new(MemoryStorage::new()), AllowedFileTypes::default());
//! let file = service
//!     .upload(UploadedFile::new("invoice.pdf", bytes), &UploadOptions::default())
//!     .await?;
//! ```

pub mod model;
pub mod service;
pub mod storage;

pub use model::{File, ImageDimensions, UploadOptions, UploadedFile};
pub use service::{AllowedFileTypes, FileError, FileResult, FileService, ImageOptimizer};
pub use storage::{
    calculate_digest, generate_key, generate_saved_name, LocalStorage, MemoryStorage, Storage,
    StorageError, StorageResult, StoredBlob,
};
