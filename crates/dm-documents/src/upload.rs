//! Upload Orchestrator
//!
//! Attaches a batch of uploaded files to one owner. The batch is
//! all-or-nothing: a name clash with an existing document of the owner
//! rejects every file, and any later failure rolls the transaction back and
//! removes the blobs already written. Names repeated within one batch are
//! not a clash; each copy becomes its own document.

use std::collections::HashSet;
use std::sync::Arc;

use dm_core::config::DocumentsConfig;
use dm_core::traits::Id;
use dm_files::{File, FileService, ImageDimensions, UploadOptions, UploadedFile};
use tracing::{info, instrument, warn};

use crate::error::{DocumentError, DocumentResult};
use crate::model::{Document, OwnerRef};
use crate::ocr::{OcrDispatcher, OcrTask};
use crate::registry::{OwnerRegistry, OwnerType};
use crate::store::{DocumentStore, DocumentTransaction};

pub struct UploadOrchestrator {
    store: Arc<dyn DocumentStore>,
    registry: Arc<OwnerRegistry>,
    files: Arc<FileService>,
    ocr: OcrDispatcher,
    options: UploadOptions,
    loggable_morph: String,
}

/// Work done inside the transaction, kept for commit or compensation
#[derive(Default)]
struct Batch {
    documents: Vec<Document>,
    stored: Vec<File>,
    ocr_tasks: Vec<OcrTask>,
}

impl UploadOrchestrator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        registry: Arc<OwnerRegistry>,
        files: Arc<FileService>,
        ocr: OcrDispatcher,
    ) -> Self {
        Self {
            store,
            registry,
            files,
            ocr,
            options: UploadOptions::optimized(ImageDimensions::default()),
            loggable_morph: "document".to_string(),
        }
    }

    /// Image resizing and activity tag from configuration
    pub fn configure(mut self, config: &DocumentsConfig) -> Self {
        self.options = UploadOptions::optimized(ImageDimensions::new(
            config.image_width,
            config.image_height,
        ));
        self.loggable_morph = config.loggable_morph.clone();
        self
    }

    pub fn upload_options(&self) -> &UploadOptions {
        &self.options
    }

    /// Attach `files` to the owner, one document per file, in input order
    #[instrument(skip(self, files), fields(count = files.len(), morph = %self.loggable_morph))]
    pub async fn store(
        &self,
        owner_type: &str,
        owner_id: Id,
        files: Vec<UploadedFile>,
    ) -> DocumentResult<Vec<Document>> {
        let owner_type = self.registry.resolve(owner_type)?;
        let owner = owner_type.owner(owner_id);

        let mut tx = self.store.begin().await?;
        let mut batch = Batch::default();

        if let Err(e) = self
            .store_in(tx.as_mut(), &owner_type, &owner, files, &mut batch)
            .await
        {
            if let Err(rollback) = tx.rollback().await {
                warn!(error = %rollback, "Rollback failed");
            }
            self.compensate(&batch).await;
            return Err(e);
        }

        if let Err(e) = tx.commit().await {
            self.compensate(&batch).await;
            return Err(e);
        }

        for document in &batch.documents {
            info!(
                document_id = document.id,
                owner = %owner,
                filename = document.original_name().unwrap_or_default(),
                "Document created"
            );
        }

        self.ocr.dispatch_all(batch.ocr_tasks).await;

        Ok(batch.documents)
    }

    async fn store_in(
        &self,
        tx: &mut dyn DocumentTransaction,
        owner_type: &OwnerType,
        owner: &OwnerRef,
        files: Vec<UploadedFile>,
        batch: &mut Batch,
    ) -> DocumentResult<()> {
        if !tx.lock_owner(owner_type, owner.owner_id).await? {
            return Err(DocumentError::owner_not_found(
                &owner.owner_type,
                owner.owner_id,
            ));
        }

        if files.is_empty() {
            return Ok(());
        }

        let existing: HashSet<String> = tx
            .documents_for(owner)
            .await?
            .into_iter()
            .filter_map(|d| d.file.map(|f| f.original_name))
            .collect();

        let conflicts = conflicting_names(&existing, &files);
        if !conflicts.is_empty() {
            warn!(owner = %owner, files = %conflicts.join(", "), "Upload rejected, duplicate file names");
            return Err(DocumentError::DuplicateFileConflict(conflicts.join(", ")));
        }

        for upload in files {
            let file = self.files.upload(upload, &self.options).await?;
            batch.stored.push(file.clone());

            let document = tx.insert(owner, file).await?;
            if OcrDispatcher::is_eligible(owner_type, &document) {
                batch.ocr_tasks.push(OcrTask::new(document.id));
            }
            batch.documents.push(document);
        }

        tx.touch_owner(owner_type, owner.owner_id).await?;
        Ok(())
    }

    /// Remove blobs written by a batch that did not commit
    async fn compensate(&self, batch: &Batch) {
        if batch.stored.is_empty() {
            return;
        }
        let removed = self.files.delete_all(&batch.stored).await;
        warn!(removed, total = batch.stored.len(), "Upload rolled back, stored files removed");
    }
}

/// Incoming names already present, in input order without repeats
fn conflicting_names(existing: &HashSet<String>, files: &[UploadedFile]) -> Vec<String> {
    let mut reported = HashSet::new();
    let mut conflicts = Vec::new();

    for file in files {
        let name = file.original_name.as_str();
        if existing.contains(name) && reported.insert(name) {
            conflicts.push(name.to_string());
        }
    }

    conflicts
}
