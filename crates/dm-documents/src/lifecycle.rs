//! Owner Lifecycle Guard
//!
//! Hooks the owner's deletion path runs inside its transaction. Under
//! `restrict` an owner with documents cannot be deleted; under `cascade` its
//! documents go with it; otherwise they are left in place.

use std::sync::Arc;

use dm_core::config::OnDeletePolicy;
use dm_core::traits::Id;
use dm_files::FileService;
use tracing::{info, instrument, warn};

use crate::error::{DocumentError, DocumentResult};
use crate::model::{Document, OwnerRef};
use crate::registry::OwnerRegistry;
use crate::store::{DocumentStore, DocumentTransaction};

pub struct OwnerLifecycleGuard {
    policy: OnDeletePolicy,
    store: Arc<dyn DocumentStore>,
    registry: Arc<OwnerRegistry>,
    files: Arc<FileService>,
}

impl OwnerLifecycleGuard {
    pub fn new(
        policy: OnDeletePolicy,
        store: Arc<dyn DocumentStore>,
        registry: Arc<OwnerRegistry>,
        files: Arc<FileService>,
    ) -> Self {
        Self {
            policy,
            store,
            registry,
            files,
        }
    }

    pub fn policy(&self) -> OnDeletePolicy {
        self.policy
    }

    /// Runs before the owner row is deleted
    pub async fn before_delete(
        &self,
        tx: &mut dyn DocumentTransaction,
        owner: &OwnerRef,
    ) -> DocumentResult<()> {
        if self.policy == OnDeletePolicy::Restrict && tx.has_documents(owner).await? {
            warn!(owner = %owner, "Deletion blocked, owner has documents");
            return Err(DocumentError::ConflictingDocumentsExist);
        }
        Ok(())
    }

    /// Runs after the owner row is deleted. Returns the documents removed
    /// with it, whose stored files the caller deletes after commit.
    pub async fn after_delete(
        &self,
        tx: &mut dyn DocumentTransaction,
        owner: &OwnerRef,
    ) -> DocumentResult<Vec<Document>> {
        if self.policy != OnDeletePolicy::Cascade {
            return Ok(Vec::new());
        }
        tx.delete_for_owner(owner).await
    }

    /// Delete an owner with its deletion hooks applied
    #[instrument(skip(self), fields(policy = %self.policy))]
    pub async fn destroy_owner(&self, owner_type: &str, owner_id: Id) -> DocumentResult<Vec<Document>> {
        let owner_type = self.registry.resolve(owner_type)?;
        let owner = owner_type.owner(owner_id);

        let mut tx = self.store.begin().await?;

        self.before_delete(tx.as_mut(), &owner).await?;
        if !tx.delete_owner(&owner_type, owner_id).await? {
            tx.rollback().await?;
            return Err(DocumentError::owner_not_found(&owner_type.name, owner_id));
        }
        let removed = self.after_delete(tx.as_mut(), &owner).await?;

        tx.commit().await?;

        let files = removed.iter().filter_map(|d| d.file.as_ref());
        self.files.delete_all(files).await;

        info!(owner = %owner, documents = removed.len(), "Owner deleted");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDocumentStore;
    use crate::registry::OwnerType;
    use dm_files::{AllowedFileTypes, File, MemoryStorage};

    async fn setup(policy: OnDeletePolicy) -> (OwnerLifecycleGuard, MemoryDocumentStore) {
        let store = MemoryDocumentStore::new();
        store.add_owner("Project", 1).await;

        let mut tx = store.begin().await.unwrap();
        tx.insert(
            &OwnerRef::new("Project", 1),
            File::new("a.pdf", "k/a.pdf", "application/pdf", 1, "d"),
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let registry = OwnerRegistry::new().register(OwnerType::new("Project", "projects"));
        let files = FileService::new(Arc::new(MemoryStorage::new()), AllowedFileTypes::default());
        let guard = OwnerLifecycleGuard::new(
            policy,
            Arc::new(store.clone()),
            Arc::new(registry),
            Arc::new(files),
        );
        (guard, store)
    }

    #[tokio::test]
    async fn test_restrict_blocks_delete() {
        let (guard, store) = setup(OnDeletePolicy::Restrict).await;

        let result = guard.destroy_owner("Project", 1).await;
        assert!(matches!(result, Err(DocumentError::ConflictingDocumentsExist)));
        assert!(store.owner_updated_at("Project", 1).await.is_some());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_cascade_removes_documents() {
        let (guard, store) = setup(OnDeletePolicy::Cascade).await;

        let removed = guard.destroy_owner("Project", 1).await.unwrap();
        assert_eq!(removed.len(), 1);
        assert!(store.owner_updated_at("Project", 1).await.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_none_leaves_orphans() {
        let (guard, store) = setup(OnDeletePolicy::None).await;

        let removed = guard.destroy_owner("Project", 1).await.unwrap();
        assert!(removed.is_empty());
        assert!(store.owner_updated_at("Project", 1).await.is_none());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_missing_owner() {
        let (guard, _store) = setup(OnDeletePolicy::Cascade).await;

        let result = guard.destroy_owner("Project", 42).await;
        assert!(matches!(result, Err(DocumentError::OwnerNotFound { owner_id: 42, .. })));
    }
}
