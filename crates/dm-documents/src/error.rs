//! Document errors

use dm_core::{traits::Id, DmError};
use dm_files::FileError;
use dm_jobs::JobError;
use thiserror::Error;

/// Boxed error from a store backend, kept as is
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("{owner_type} {owner_id} not found")]
    OwnerNotFound { owner_type: String, owner_id: Id },

    #[error("Unknown owner type: {0}")]
    UnknownOwnerType(String),

    #[error("File(s) {0} already uploaded for this entity")]
    DuplicateFileConflict(String),

    #[error("The entity has attached documents and cannot be deleted")]
    ConflictingDocumentsExist,

    #[error("Document not found: {0}")]
    NotFound(Id),

    #[error(transparent)]
    File(#[from] FileError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error("Store error: {0}")]
    Store(#[source] StoreError),
}

pub type DocumentResult<T> = Result<T, DocumentError>;

impl DocumentError {
    pub fn owner_not_found(owner_type: impl Into<String>, owner_id: Id) -> Self {
        Self::OwnerNotFound {
            owner_type: owner_type.into(),
            owner_id,
        }
    }

    pub fn store(err: impl Into<StoreError>) -> Self {
        Self::Store(err.into())
    }

    /// Names carried by a duplicate conflict
    pub fn conflicting_names(&self) -> Vec<&str> {
        match self {
            Self::DuplicateFileConflict(names) => names.split(", ").collect(),
            _ => Vec::new(),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::OwnerNotFound { .. } | Self::NotFound(_) => 404,
            Self::DuplicateFileConflict(_) | Self::ConflictingDocumentsExist => 409,
            Self::UnknownOwnerType(_) => 422,
            Self::File(FileError::Storage(_)) => 500,
            Self::File(_) => 422,
            Self::Job(_) => 503,
            Self::Store(_) => 500,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::OwnerNotFound { .. } => "owner_not_found",
            Self::UnknownOwnerType(_) => "unknown_owner_type",
            Self::DuplicateFileConflict(_) => "duplicate_file",
            Self::ConflictingDocumentsExist => "conflicting_documents",
            Self::NotFound(_) => "not_found",
            Self::File(_) => "file_error",
            Self::Job(_) => "queue_error",
            Self::Store(_) => "store_error",
        }
    }

    /// Errors the caller can fix by changing its input
    pub fn is_user_facing(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

impl From<DocumentError> for DmError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::OwnerNotFound {
                owner_type,
                owner_id,
            } => DmError::NotFound {
                entity: "Owner",
                field: "id",
                value: format!("{} {}", owner_type, owner_id),
            },
            DocumentError::NotFound(id) => DmError::not_found("Document", "id", id),
            e @ (DocumentError::DuplicateFileConflict(_)
            | DocumentError::ConflictingDocumentsExist) => DmError::conflict(e.to_string()),
            e @ DocumentError::UnknownOwnerType(_) => DmError::validation(e.to_string()),
            DocumentError::File(e) => e.into(),
            DocumentError::Job(e) => e.into(),
            DocumentError::Store(e) => DmError::Database(e.to_string()),
        }
    }
}
