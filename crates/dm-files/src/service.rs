//! File Service
//!
//! Stores uploaded bytes in a storage backend and produces the `File`
//! metadata record for them.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dm_core::DmError;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::model::{is_image_type, File, ImageDimensions, UploadOptions, UploadedFile};
use crate::storage::{generate_key, Storage, StorageError};

/// Service errors
#[derive(Debug, Error)]
pub enum FileError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Invalid file: {0}")]
    InvalidFile(String),
    #[error("File too large: {size} bytes (max: {max} bytes)")]
    FileTooLarge { size: u64, max: u64 },
    #[error("Invalid content type: {0}")]
    InvalidContentType(String),
    #[error("Image optimization failed: {0}")]
    Optimization(String),
}

pub type FileResult<T> = Result<T, FileError>;

impl From<FileError> for DmError {
    fn from(err: FileError) -> Self {
        match err {
            FileError::Storage(e) => DmError::Storage(e.to_string()),
            FileError::Optimization(e) => DmError::Internal(e),
            e => DmError::validation(e.to_string()),
        }
    }
}

/// Shrinks or re-encodes images before they are stored
///
/// Implementations live outside this crate; the service only decides when
/// to call one.
#[async_trait]
pub trait ImageOptimizer: Send + Sync {
    async fn optimize(
        &self,
        data: Bytes,
        mime_type: &str,
        resize: Option<ImageDimensions>,
    ) -> FileResult<Bytes>;
}

/// Allowed file types configuration
#[derive(Debug, Clone)]
pub struct AllowedFileTypes {
    /// Allowed MIME types (empty = allow all)
    pub allowed_mime_types: Vec<String>,
    /// Blocked MIME types
    pub blocked_mime_types: Vec<String>,
    /// Maximum file size in bytes
    pub max_file_size: u64,
}

impl Default for AllowedFileTypes {
    fn default() -> Self {
        Self {
            allowed_mime_types: Vec::new(),
            blocked_mime_types: vec![
                "application/x-msdownload".to_string(),
                "application/x-executable".to_string(),
            ],
            max_file_size: 100 * 1024 * 1024, // 100 MB
        }
    }
}

impl AllowedFileTypes {
    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    /// Check if a content type is allowed
    pub fn is_allowed(&self, content_type: &str) -> bool {
        if self.blocked_mime_types.iter().any(|t| t == content_type) {
            return false;
        }

        if self.allowed_mime_types.is_empty() {
            return true;
        }

        self.allowed_mime_types.iter().any(|t| t == content_type)
    }
}

/// File service
pub struct FileService {
    storage: Arc<dyn Storage>,
    allowed_types: AllowedFileTypes,
    optimizer: Option<Arc<dyn ImageOptimizer>>,
}

impl FileService {
    pub fn new(storage: Arc<dyn Storage>, allowed_types: AllowedFileTypes) -> Self {
        Self {
            storage,
            allowed_types,
            optimizer: None,
        }
    }

    pub fn with_optimizer(mut self, optimizer: Arc<dyn ImageOptimizer>) -> Self {
        self.optimizer = Some(optimizer);
        self
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Validate and store an uploaded file
    #[instrument(skip(self, upload), fields(filename = %upload.original_name, storage = self.storage.name()))]
    pub async fn upload(&self, upload: UploadedFile, options: &UploadOptions) -> FileResult<File> {
        if upload.original_name.trim().is_empty() {
            return Err(FileError::InvalidFile("file name can't be blank".to_string()));
        }

        let size = upload.data.len() as u64;
        if size > self.allowed_types.max_file_size {
            return Err(FileError::FileTooLarge {
                size,
                max: self.allowed_types.max_file_size,
            });
        }

        let mime_type = upload.resolved_mime_type();
        if !self.allowed_types.is_allowed(&mime_type) {
            return Err(FileError::InvalidContentType(mime_type));
        }

        let data = self.optimize(upload.data, &mime_type, options).await?;

        let key = generate_key(&upload.original_name);
        let blob = self.storage.put(&key, data).await?;

        info!(key = %key, size = blob.size, mime_type = %mime_type, "File stored");

        Ok(File::new(
            upload.original_name,
            key,
            mime_type,
            blob.size as i64,
            blob.digest,
        ))
    }

    async fn optimize(
        &self,
        data: Bytes,
        mime_type: &str,
        options: &UploadOptions,
    ) -> FileResult<Bytes> {
        if !options.optimize_images || !is_image_type(mime_type) {
            return Ok(data);
        }

        match &self.optimizer {
            Some(optimizer) => optimizer.optimize(data, mime_type, options.resize).await,
            None => {
                debug!(mime_type, "No image optimizer configured, storing as is");
                Ok(data)
            }
        }
    }

    /// Read the stored bytes of a file
    pub async fn read(&self, file: &File) -> FileResult<Bytes> {
        Ok(self.storage.get(&file.saved_name).await?)
    }

    /// Public URL of a stored file
    pub fn url(&self, file: &File) -> String {
        self.storage.url(&file.saved_name)
    }

    /// Remove a file's bytes from storage
    #[instrument(skip(self, file), fields(key = %file.saved_name))]
    pub async fn delete(&self, file: &File) -> FileResult<()> {
        self.storage.delete(&file.saved_name).await?;
        debug!(filename = %file.original_name, "File removed from storage");
        Ok(())
    }

    /// Best-effort removal of several files; failures are logged, not returned
    pub async fn delete_all<'a>(&self, files: impl IntoIterator<Item = &'a File>) -> usize {
        let mut removed = 0;
        for file in files {
            match self.delete(file).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(key = %file.saved_name, error = %e, "Failed to remove file"),
            }
        }
        removed
    }
}
