//! End-to-end behavior of uploads, queries, OCR and owner deletion against
//! the in-memory backends.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration, Utc};
use dm_core::config::{DocumentsConfig, OnDeletePolicy};
use dm_documents::{
    DocumentError, DocumentQuery, DocumentService, DocumentStore, MemoryDocumentStore,
    OcrDispatcher, OcrEngine, OcrJobHandler, OcrTask, OwnerLifecycleGuard, OwnerRegistry,
    OwnerType, UploadOrchestrator, OCR_JOB, OCR_QUEUE,
};
use dm_files::{AllowedFileTypes, FileService, MemoryStorage, UploadedFile};
use dm_jobs::{JobQueue, JobStatus, JobWorker, MemoryJobQueue};

struct Harness {
    store: MemoryDocumentStore,
    storage: Arc<MemoryStorage>,
    queue: Arc<MemoryJobQueue>,
    uploads: Arc<UploadOrchestrator>,
    documents: Arc<DocumentService>,
    registry: Arc<OwnerRegistry>,
    files: Arc<FileService>,
}

impl Harness {
    async fn new() -> Self {
        let store = MemoryDocumentStore::new();
        store.add_owner("Project", 1).await;
        store.add_owner("Project", 2).await;
        store.add_owner("Invoice", 1).await;

        let registry = Arc::new(
            OwnerRegistry::new()
                .register(OwnerType::new("Project", "projects").alias("project"))
                .register(OwnerType::new("Invoice", "invoices").ocrable()),
        );
        let storage = Arc::new(MemoryStorage::new());
        let files = Arc::new(FileService::new(
            storage.clone(),
            AllowedFileTypes::default().with_max_file_size(1024),
        ));
        let queue = Arc::new(MemoryJobQueue::new());

        let uploads = Arc::new(
            UploadOrchestrator::new(
                Arc::new(store.clone()),
                registry.clone(),
                files.clone(),
                OcrDispatcher::new(queue.clone()),
            )
            .configure(&DocumentsConfig::default()),
        );

        let documents = Arc::new(DocumentService::new(
            Arc::new(store.clone()),
            registry.clone(),
            files.clone(),
        ));

        Self {
            store,
            storage,
            queue,
            uploads,
            documents,
            registry,
            files,
        }
    }

    fn guard(&self, policy: OnDeletePolicy) -> OwnerLifecycleGuard {
        OwnerLifecycleGuard::new(
            policy,
            Arc::new(self.store.clone()),
            self.registry.clone(),
            self.files.clone(),
        )
    }
}

fn pdf(name: &str) -> UploadedFile {
    UploadedFile::new(name, b"%PDF-1.4 test".to_vec())
}

fn png(name: &str) -> UploadedFile {
    UploadedFile::new(name, b"\x89PNG test".to_vec())
}

fn names(documents: &[dm_documents::Document]) -> Vec<&str> {
    documents.iter().filter_map(|d| d.original_name()).collect()
}

#[tokio::test]
async fn upload_creates_documents_in_input_order() {
    let h = Harness::new().await;

    let docs = h
        .uploads
        .store("Project", 1, vec![pdf("b.pdf"), pdf("a.pdf"), png("c.png")])
        .await
        .unwrap();

    assert_eq!(names(&docs), vec!["b.pdf", "a.pdf", "c.png"]);
    assert!(docs.iter().all(|d| d.owner_type == "Project" && d.owner_id == 1));
    assert_eq!(h.store.len().await, 3);
    assert_eq!(h.storage.len().await, 3);
}

#[tokio::test]
async fn upload_touches_owner() {
    let h = Harness::new().await;
    let before = Utc::now() - Duration::days(1);
    h.store.add_owner_at("Project", 3, before).await;

    h.uploads
        .store("Project", 3, vec![pdf("a.pdf")])
        .await
        .unwrap();

    let after = h.store.owner_updated_at("Project", 3).await.unwrap();
    assert!(after > before);
}

#[tokio::test]
async fn rejected_upload_leaves_owner_untouched() {
    let h = Harness::new().await;
    h.uploads
        .store("Project", 1, vec![pdf("a.pdf")])
        .await
        .unwrap();
    let before = Utc::now() - Duration::days(1);
    h.store.add_owner_at("Project", 1, before).await;

    assert!(h
        .uploads
        .store("Project", 1, vec![pdf("a.pdf")])
        .await
        .is_err());

    assert_eq!(h.store.owner_updated_at("Project", 1).await, Some(before));
}

#[tokio::test]
async fn alias_resolves_to_canonical_owner_type() {
    let h = Harness::new().await;

    let docs = h
        .uploads
        .store("project", 1, vec![pdf("a.pdf")])
        .await
        .unwrap();

    assert_eq!(docs[0].owner_type, "Project");
}

#[tokio::test]
async fn duplicate_name_rejects_whole_batch() {
    let h = Harness::new().await;
    h.uploads
        .store("Project", 1, vec![pdf("a.pdf")])
        .await
        .unwrap();

    let result = h
        .uploads
        .store("Project", 1, vec![pdf("new.pdf"), pdf("a.pdf")])
        .await;

    let err = result.unwrap_err();
    assert!(matches!(err, DocumentError::DuplicateFileConflict(_)));
    assert_eq!(err.to_string(), "File(s) a.pdf already uploaded for this entity");
    assert_eq!(h.store.len().await, 1);
    assert_eq!(h.storage.len().await, 1);
}

#[tokio::test]
async fn duplicate_message_lists_every_clash() {
    let h = Harness::new().await;
    h.uploads
        .store("Project", 1, vec![pdf("a.pdf"), pdf("b.pdf")])
        .await
        .unwrap();

    let err = h
        .uploads
        .store("Project", 1, vec![pdf("b.pdf"), pdf("c.pdf"), pdf("a.pdf")])
        .await
        .unwrap_err();

    assert_eq!(err.conflicting_names(), vec!["b.pdf", "a.pdf"]);
}

#[tokio::test]
async fn repeated_name_within_batch_creates_each() {
    let h = Harness::new().await;

    let docs = h
        .uploads
        .store("Invoice", 1, vec![pdf("x.pdf"), pdf("x.pdf")])
        .await
        .unwrap();

    assert_eq!(names(&docs), vec!["x.pdf", "x.pdf"]);
    assert_ne!(docs[0].id, docs[1].id);
    assert_eq!(h.storage.len().await, 2);
    assert_eq!(h.queue.pending_count(OCR_QUEUE).await.unwrap(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_uploads_of_same_name_admit_one() {
    let h = Harness::new().await;

    let first = tokio::spawn({
        let uploads = h.uploads.clone();
        async move { uploads.store("Project", 1, vec![pdf("a.pdf")]).await }
    });
    let second = tokio::spawn({
        let uploads = h.uploads.clone();
        async move { uploads.store("Project", 1, vec![pdf("a.pdf")]).await }
    });

    let results = [first.await.unwrap(), second.await.unwrap()];
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(DocumentError::DuplicateFileConflict(_)))));
    assert_eq!(h.store.len().await, 1);
    assert_eq!(h.storage.len().await, 1);
}

#[tokio::test]
async fn same_name_under_other_owner_is_allowed() {
    let h = Harness::new().await;
    h.uploads
        .store("Project", 1, vec![pdf("a.pdf")])
        .await
        .unwrap();

    h.uploads
        .store("Project", 2, vec![pdf("a.pdf")])
        .await
        .unwrap();
    h.uploads
        .store("Invoice", 1, vec![pdf("a.pdf")])
        .await
        .unwrap();

    assert_eq!(h.store.len().await, 3);
}

#[tokio::test]
async fn failure_mid_batch_rolls_back_and_removes_blobs() {
    let h = Harness::new().await;
    let too_large = UploadedFile::new("big.pdf", vec![0u8; 4096]);

    let result = h
        .uploads
        .store("Project", 1, vec![pdf("a.pdf"), too_large])
        .await;

    assert!(matches!(result, Err(DocumentError::File(_))));
    assert!(h.store.is_empty().await);
    assert!(h.storage.is_empty().await);
}

#[tokio::test]
async fn unknown_owner_type_and_missing_owner() {
    let h = Harness::new().await;

    let unknown = h.uploads.store("Spaceship", 1, vec![pdf("a.pdf")]).await;
    assert!(matches!(unknown, Err(DocumentError::UnknownOwnerType(_))));

    let missing = h.uploads.store("Project", 99, vec![pdf("a.pdf")]).await;
    assert!(matches!(
        missing,
        Err(DocumentError::OwnerNotFound { owner_id: 99, .. })
    ));
    assert!(h.storage.is_empty().await);
}

#[tokio::test]
async fn empty_batch_still_validates_owner() {
    let h = Harness::new().await;

    let docs = h.uploads.store("Project", 1, Vec::new()).await.unwrap();
    assert!(docs.is_empty());

    let missing = h.uploads.store("Project", 99, Vec::new()).await;
    assert!(matches!(missing, Err(DocumentError::OwnerNotFound { .. })));
}

#[tokio::test]
async fn filter_and_order() {
    let h = Harness::new().await;
    let docs = h
        .uploads
        .store(
            "Project",
            1,
            vec![pdf("report-2023.pdf"), pdf("invoice.pdf"), pdf("Report-old.pdf")],
        )
        .await
        .unwrap();
    h.uploads
        .store("Project", 2, vec![pdf("report-other.pdf")])
        .await
        .unwrap();
    h.documents
        .update_text(docs[1].id, Some("see the annual report".to_string()))
        .await
        .unwrap();

    let all = h.documents.index("Project", 1, Some("")).await.unwrap();
    assert_eq!(all.len(), 3);

    let found = h.documents.index("Project", 1, Some("report")).await.unwrap();
    let mut found = names(&found);
    found.sort();
    assert_eq!(found, vec!["invoice.pdf", "report-2023.pdf"]);

    let ordered = h
        .store
        .query(&DocumentQuery::new().for_owner("Project", 1).ordered())
        .await
        .unwrap();
    let ids: Vec<_> = ordered.iter().map(|d| d.id).collect();
    let mut expected: Vec<_> = docs.iter().map(|d| d.id).collect();
    expected.reverse();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn index_of_missing_owner_fails() {
    let h = Harness::new().await;

    let missing = h.documents.index("Project", 99, None).await;
    assert!(matches!(
        missing,
        Err(DocumentError::OwnerNotFound { owner_id: 99, .. })
    ));

    let unknown = h.documents.index("Spaceship", 1, None).await;
    assert!(matches!(unknown, Err(DocumentError::UnknownOwnerType(_))));

    assert!(h.documents.index("project", 2, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn pdf_of_ocrable_owner_enqueues_one_task() {
    let h = Harness::new().await;

    let docs = h
        .uploads
        .store("Invoice", 1, vec![pdf("scan.pdf"), png("photo.png")])
        .await
        .unwrap();

    let jobs = h.queue.list(OCR_QUEUE, None).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].job_type, OCR_JOB);
    assert_eq!(jobs[0].payload::<OcrTask>().unwrap(), OcrTask::new(docs[0].id));
}

#[tokio::test]
async fn non_ocrable_owner_enqueues_nothing() {
    let h = Harness::new().await;

    h.uploads
        .store("Project", 1, vec![pdf("scan.pdf")])
        .await
        .unwrap();

    assert_eq!(h.queue.pending_count(OCR_QUEUE).await.unwrap(), 0);
}

#[tokio::test]
async fn rejected_batch_enqueues_nothing() {
    let h = Harness::new().await;
    h.uploads
        .store("Invoice", 1, vec![pdf("scan.pdf")])
        .await
        .unwrap();

    let result = h
        .uploads
        .store("Invoice", 1, vec![pdf("other.pdf"), pdf("scan.pdf")])
        .await;

    assert!(matches!(result, Err(DocumentError::DuplicateFileConflict(_))));
    assert_eq!(h.queue.pending_count(OCR_QUEUE).await.unwrap(), 1);
}

#[tokio::test]
async fn failed_batch_after_eligible_pdf_enqueues_nothing() {
    let h = Harness::new().await;
    let too_large = UploadedFile::new("oversized.pdf", vec![0u8; 4096]);

    let result = h
        .uploads
        .store("Invoice", 1, vec![pdf("scan.pdf"), too_large])
        .await;

    assert!(matches!(result, Err(DocumentError::File(_))));
    assert!(h.store.is_empty().await);
    assert!(h.storage.is_empty().await);
    assert_eq!(h.queue.pending_count(OCR_QUEUE).await.unwrap(), 0);
}

struct FixedText;

#[async_trait]
impl OcrEngine for FixedText {
    async fn extract_text(&self, pdf: Bytes) -> Result<String, String> {
        Ok(format!("extracted {} bytes", pdf.len()))
    }
}

#[tokio::test]
async fn worker_stores_extracted_text() {
    let h = Harness::new().await;
    let docs = h
        .uploads
        .store("Invoice", 1, vec![pdf("scan.pdf")])
        .await
        .unwrap();

    let mut worker = JobWorker::new(h.queue.clone(), OCR_QUEUE);
    worker.register(
        OCR_JOB,
        OcrJobHandler::new(h.documents.clone(), Arc::new(FixedText)),
    );
    assert!(worker.process_one().await.unwrap());

    let document = h.documents.show(docs[0].id).await.unwrap();
    assert_eq!(document.text.as_deref(), Some("extracted 13 bytes"));

    let jobs = h.queue.list(OCR_QUEUE, Some(JobStatus::Completed)).await.unwrap();
    assert_eq!(jobs.len(), 1);
}

#[tokio::test]
async fn restrict_blocks_owner_deletion() {
    let h = Harness::new().await;
    h.uploads
        .store("Project", 1, vec![pdf("a.pdf")])
        .await
        .unwrap();

    let err = h
        .guard(OnDeletePolicy::Restrict)
        .destroy_owner("Project", 1)
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "The entity has attached documents and cannot be deleted"
    );
    assert_eq!(err.status_code(), 409);
    assert!(h.store.owner_updated_at("Project", 1).await.is_some());
    assert_eq!(h.store.len().await, 1);

    // Owners without documents can still go
    h.guard(OnDeletePolicy::Restrict)
        .destroy_owner("Project", 2)
        .await
        .unwrap();
}

#[tokio::test]
async fn cascade_removes_documents_and_files() {
    let h = Harness::new().await;
    h.uploads
        .store("Project", 1, vec![pdf("a.pdf"), pdf("b.pdf")])
        .await
        .unwrap();
    h.uploads
        .store("Project", 2, vec![pdf("a.pdf")])
        .await
        .unwrap();

    let removed = h
        .guard(OnDeletePolicy::Cascade)
        .destroy_owner("Project", 1)
        .await
        .unwrap();

    assert_eq!(removed.len(), 2);
    let left = h
        .store
        .count(&DocumentQuery::new().for_owner("Project", 1))
        .await
        .unwrap();
    assert_eq!(left, 0);
    assert_eq!(h.store.len().await, 1);
    assert_eq!(h.storage.len().await, 1);
}

#[tokio::test]
async fn destroy_document_removes_file() {
    let h = Harness::new().await;
    let docs = h
        .uploads
        .store("Project", 1, vec![pdf("a.pdf")])
        .await
        .unwrap();

    h.documents.destroy(docs[0].id).await.unwrap();

    assert!(h.store.is_empty().await);
    assert!(h.storage.is_empty().await);
    assert!(matches!(
        h.documents.show(docs[0].id).await,
        Err(DocumentError::NotFound(_))
    ));
    assert!(matches!(
        h.documents.destroy(docs[0].id).await,
        Err(DocumentError::NotFound(_))
    ));
}

#[tokio::test]
async fn owner_accessors() {
    let h = Harness::new().await;
    let owner = h.registry.owner_ref("Project", 1).unwrap();
    assert!(h.documents.document(&owner).await.unwrap().is_none());

    let docs = h
        .uploads
        .store("Project", 1, vec![pdf("a.pdf"), pdf("b.pdf")])
        .await
        .unwrap();

    let first = h.documents.document(&owner).await.unwrap().unwrap();
    assert_eq!(first.id, docs[0].id);
    assert_eq!(h.documents.documents(&owner).await.unwrap().len(), 2);

    let bytes = h.documents.read(&first).await.unwrap();
    assert_eq!(&bytes[..], b"%PDF-1.4 test");
    assert!(h.documents.url(&first).is_some());
}
