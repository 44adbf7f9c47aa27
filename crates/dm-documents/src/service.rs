//! Document service
//!
//! Per-document operations once a document exists: show, list, annotate,
//! destroy, plus the owner-side accessors.

use std::sync::Arc;

use bytes::Bytes;
use dm_core::traits::Id;
use dm_files::FileService;
use tracing::{info, instrument, warn};

use crate::error::{DocumentError, DocumentResult};
use crate::model::{Document, OwnerRef};
use crate::query::DocumentQuery;
use crate::registry::OwnerRegistry;
use crate::store::{DocumentStore, DocumentTransaction};

pub struct DocumentService {
    store: Arc<dyn DocumentStore>,
    registry: Arc<OwnerRegistry>,
    files: Arc<FileService>,
    loggable_morph: String,
}

impl DocumentService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        registry: Arc<OwnerRegistry>,
        files: Arc<FileService>,
    ) -> Self {
        Self {
            store,
            registry,
            files,
            loggable_morph: "document".to_string(),
        }
    }

    /// Tag attached to activity log lines
    pub fn loggable_morph(mut self, morph: impl Into<String>) -> Self {
        self.loggable_morph = morph.into();
        self
    }

    pub async fn show(&self, id: Id) -> DocumentResult<Document> {
        self.store
            .find(id)
            .await?
            .ok_or(DocumentError::NotFound(id))
    }

    /// Newest-first listing of one owner's documents, optionally searched
    ///
    /// Fails with `OwnerNotFound` when the owner row does not exist.
    pub async fn index(
        &self,
        owner_type: &str,
        owner_id: Id,
        search: Option<&str>,
    ) -> DocumentResult<Vec<Document>> {
        let owner_type = self.registry.resolve(owner_type)?;
        if !self.store.owner_exists(&owner_type, owner_id).await? {
            return Err(DocumentError::owner_not_found(&owner_type.name, owner_id));
        }

        let query = DocumentQuery::new()
            .for_ref(owner_type.owner(owner_id))
            .filter(search.unwrap_or_default())
            .ordered();

        self.store.query(&query).await
    }

    /// All documents of an owner, oldest first
    pub async fn documents(&self, owner: &OwnerRef) -> DocumentResult<Vec<Document>> {
        self.store
            .query(&DocumentQuery::new().for_ref(owner.clone()))
            .await
    }

    /// The owner's first document, for owners that hold a single one
    pub async fn document(&self, owner: &OwnerRef) -> DocumentResult<Option<Document>> {
        Ok(self.documents(owner).await?.into_iter().next())
    }

    /// Replace a document's text and touch its owner
    #[instrument(skip(self, text), fields(morph = %self.loggable_morph))]
    pub async fn update_text(&self, id: Id, text: Option<String>) -> DocumentResult<Document> {
        let mut tx = self.store.begin().await?;

        match self.update_text_in(tx.as_mut(), id, text).await {
            Ok(document) => {
                tx.commit().await?;
                info!(document_id = id, owner = %document.owner(), "Document text updated");
                Ok(document)
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    async fn update_text_in(
        &self,
        tx: &mut dyn DocumentTransaction,
        id: Id,
        text: Option<String>,
    ) -> DocumentResult<Document> {
        let document = tx.update_text(id, text).await?;

        match self.registry.resolve(&document.owner_type) {
            Ok(owner_type) => tx.touch_owner(&owner_type, document.owner_id).await?,
            Err(_) => warn!(
                document_id = id,
                owner_type = %document.owner_type,
                "Owner type no longer registered, owner not touched"
            ),
        }

        Ok(document)
    }

    /// Delete a document, then its stored file
    #[instrument(skip(self), fields(morph = %self.loggable_morph))]
    pub async fn destroy(&self, id: Id) -> DocumentResult<Document> {
        let mut tx = self.store.begin().await?;

        let Some(document) = tx.delete(id).await? else {
            tx.rollback().await?;
            return Err(DocumentError::NotFound(id));
        };

        if let Ok(owner_type) = self.registry.resolve(&document.owner_type) {
            tx.touch_owner(&owner_type, document.owner_id).await?;
        }
        tx.commit().await?;

        if let Some(file) = &document.file {
            if let Err(e) = self.files.delete(file).await {
                warn!(document_id = id, key = %file.saved_name, error = %e, "Stored file left behind");
            }
        }

        info!(document_id = id, owner = %document.owner(), "Document deleted");
        Ok(document)
    }

    /// Stored bytes of a document's file
    pub async fn read(&self, document: &Document) -> DocumentResult<Bytes> {
        let file = document
            .file
            .as_ref()
            .ok_or(DocumentError::NotFound(document.id))?;
        Ok(self.files.read(file).await?)
    }

    pub fn url(&self, document: &Document) -> Option<String> {
        document.file.as_ref().map(|f| self.files.url(f))
    }
}
