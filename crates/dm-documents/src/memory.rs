//! In-memory document store
//!
//! Used by tests and the CLI's dry runs. A transaction holds the store lock
//! for its whole lifetime and works on a private copy of the state, so
//! transactions are fully serialized and rollback is just dropping the copy.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dm_core::traits::Id;
use dm_files::File;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{DocumentError, DocumentResult};
use crate::model::{Document, OwnerRef};
use crate::query::DocumentQuery;
use crate::registry::OwnerType;
use crate::store::{DocumentStore, DocumentTransaction};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    documents: BTreeMap<Id, Document>,
    /// (owner type, owner id) -> updated_at
    owners: HashMap<(String, Id), DateTime<Utc>>,
    next_document_id: Id,
    next_file_id: Id,
}

impl MemoryState {
    fn documents_for(&self, owner: &OwnerRef) -> Vec<Document> {
        self.documents
            .values()
            .filter(|d| d.belongs_to(owner))
            .cloned()
            .collect()
    }
}

/// In-memory document store
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an owner row
    pub async fn add_owner(&self, owner_type: impl Into<String>, owner_id: Id) {
        self.add_owner_at(owner_type, owner_id, Utc::now()).await;
    }

    /// Create an owner row last updated at `updated_at`
    pub async fn add_owner_at(
        &self,
        owner_type: impl Into<String>,
        owner_id: Id,
        updated_at: DateTime<Utc>,
    ) {
        let mut state = self.state.lock().await;
        state
            .owners
            .insert((owner_type.into(), owner_id), updated_at);
    }

    /// Owner's last `updated_at`, if the owner exists
    pub async fn owner_updated_at(&self, owner_type: &str, owner_id: Id) -> Option<DateTime<Utc>> {
        let state = self.state.lock().await;
        state
            .owners
            .get(&(owner_type.to_string(), owner_id))
            .copied()
    }

    /// Total number of stored documents
    pub async fn len(&self) -> usize {
        self.state.lock().await.documents.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn begin(&self) -> DocumentResult<Box<dyn DocumentTransaction>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, working }))
    }

    async fn find(&self, id: Id) -> DocumentResult<Option<Document>> {
        let state = self.state.lock().await;
        Ok(state.documents.get(&id).cloned())
    }

    async fn query(&self, query: &DocumentQuery) -> DocumentResult<Vec<Document>> {
        let state = self.state.lock().await;
        Ok(query.apply(state.documents.values().cloned()))
    }

    async fn count(&self, query: &DocumentQuery) -> DocumentResult<usize> {
        let state = self.state.lock().await;
        Ok(state.documents.values().filter(|d| query.matches(d)).count())
    }

    async fn owner_exists(&self, owner_type: &OwnerType, owner_id: Id) -> DocumentResult<bool> {
        let state = self.state.lock().await;
        Ok(state
            .owners
            .contains_key(&(owner_type.name.clone(), owner_id)))
    }
}

/// Transaction over [`MemoryDocumentStore`]
pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl DocumentTransaction for MemoryTransaction {
    async fn lock_owner(&mut self, owner_type: &OwnerType, owner_id: Id) -> DocumentResult<bool> {
        // The whole store is already locked
        Ok(self
            .working
            .owners
            .contains_key(&(owner_type.name.clone(), owner_id)))
    }

    async fn documents_for(&mut self, owner: &OwnerRef) -> DocumentResult<Vec<Document>> {
        Ok(self.working.documents_for(owner))
    }

    async fn insert(&mut self, owner: &OwnerRef, mut file: File) -> DocumentResult<Document> {
        self.working.next_file_id += 1;
        file.id = Some(self.working.next_file_id);

        self.working.next_document_id += 1;
        let id = self.working.next_document_id;
        let now = Utc::now();

        let document = Document {
            id,
            owner_type: owner.owner_type.clone(),
            owner_id: owner.owner_id,
            text: None,
            file: Some(file),
            created_at: now,
            updated_at: now,
        };
        self.working.documents.insert(id, document.clone());

        Ok(document)
    }

    async fn update_text(&mut self, id: Id, text: Option<String>) -> DocumentResult<Document> {
        let document = self
            .working
            .documents
            .get_mut(&id)
            .ok_or(DocumentError::NotFound(id))?;
        document.text = text;
        document.updated_at = Utc::now();
        Ok(document.clone())
    }

    async fn delete(&mut self, id: Id) -> DocumentResult<Option<Document>> {
        Ok(self.working.documents.remove(&id))
    }

    async fn touch_owner(&mut self, owner_type: &OwnerType, owner_id: Id) -> DocumentResult<()> {
        if let Some(updated_at) = self
            .working
            .owners
            .get_mut(&(owner_type.name.clone(), owner_id))
        {
            *updated_at = Utc::now();
        }
        Ok(())
    }

    async fn has_documents(&mut self, owner: &OwnerRef) -> DocumentResult<bool> {
        Ok(self.working.documents.values().any(|d| d.belongs_to(owner)))
    }

    async fn delete_owner(&mut self, owner_type: &OwnerType, owner_id: Id) -> DocumentResult<bool> {
        Ok(self
            .working
            .owners
            .remove(&(owner_type.name.clone(), owner_id))
            .is_some())
    }

    async fn delete_for_owner(&mut self, owner: &OwnerRef) -> DocumentResult<Vec<Document>> {
        let removed = self.working.documents_for(owner);
        for document in &removed {
            self.working.documents.remove(&document.id);
        }
        Ok(removed)
    }

    async fn commit(self: Box<Self>) -> DocumentResult<()> {
        let MemoryTransaction { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> DocumentResult<()> {
        Ok(())
    }
}
