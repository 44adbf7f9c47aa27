//! Repository errors

use dm_core::DmError;
use dm_documents::DocumentError;

/// Error type for repository operations
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;

impl From<RepositoryError> for DocumentError {
    fn from(err: RepositoryError) -> Self {
        DocumentError::store(err)
    }
}

impl From<RepositoryError> for DmError {
    fn from(err: RepositoryError) -> Self {
        DmError::Database(err.to_string())
    }
}
