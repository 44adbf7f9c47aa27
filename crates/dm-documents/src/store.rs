//! Document Store
//!
//! Persistence seam for documents and the owner rows they point at. Reads go
//! straight through [`DocumentStore`]; every write happens inside a
//! [`DocumentTransaction`] so a failed batch leaves nothing behind.

use async_trait::async_trait;
use dm_core::traits::Id;
use dm_files::File;

use crate::error::DocumentResult;
use crate::model::{Document, OwnerRef};
use crate::query::DocumentQuery;
use crate::registry::OwnerType;

/// Document persistence
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Open a unit of work
    async fn begin(&self) -> DocumentResult<Box<dyn DocumentTransaction>>;

    /// Find a document by ID
    async fn find(&self, id: Id) -> DocumentResult<Option<Document>>;

    /// Documents matching a query
    async fn query(&self, query: &DocumentQuery) -> DocumentResult<Vec<Document>>;

    /// Number of documents matching a query
    async fn count(&self, query: &DocumentQuery) -> DocumentResult<usize>;

    /// Whether an owner row exists
    async fn owner_exists(&self, owner_type: &OwnerType, owner_id: Id) -> DocumentResult<bool>;
}

/// A unit of work against the store
///
/// Dropping a transaction without committing discards its writes.
#[async_trait]
pub trait DocumentTransaction: Send {
    /// Lock the owner row for the rest of the transaction.
    /// Returns false when the owner does not exist.
    async fn lock_owner(&mut self, owner_type: &OwnerType, owner_id: Id) -> DocumentResult<bool>;

    /// All documents of an owner, as seen by this transaction
    async fn documents_for(&mut self, owner: &OwnerRef) -> DocumentResult<Vec<Document>>;

    /// Persist a document together with its file record
    async fn insert(&mut self, owner: &OwnerRef, file: File) -> DocumentResult<Document>;

    /// Replace a document's text
    async fn update_text(&mut self, id: Id, text: Option<String>) -> DocumentResult<Document>;

    /// Delete a document row, returning it if it existed
    async fn delete(&mut self, id: Id) -> DocumentResult<Option<Document>>;

    /// Bump the owner's `updated_at`
    async fn touch_owner(&mut self, owner_type: &OwnerType, owner_id: Id) -> DocumentResult<()>;

    /// Whether any document points at the owner
    async fn has_documents(&mut self, owner: &OwnerRef) -> DocumentResult<bool>;

    /// Delete the owner row. Returns false when it did not exist.
    async fn delete_owner(&mut self, owner_type: &OwnerType, owner_id: Id) -> DocumentResult<bool>;

    /// Delete every document of an owner, returning what was removed
    async fn delete_for_owner(&mut self, owner: &OwnerRef) -> DocumentResult<Vec<Document>>;

    async fn commit(self: Box<Self>) -> DocumentResult<()>;

    async fn rollback(self: Box<Self>) -> DocumentResult<()>;
}
