//! OCR Dispatcher
//!
//! Decides which new documents get text extraction and queues the work. The
//! decision is made while the upload transaction is open; the enqueue happens
//! once it has committed, so a worker never sees a document that was rolled
//! back.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dm_core::traits::Id;
use dm_jobs::{Job, JobError, JobHandler, JobQueue, JobResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::DocumentResult;
use crate::model::Document;
use crate::registry::OwnerType;
use crate::service::DocumentService;

/// Queue OCR jobs are pushed to
pub const OCR_QUEUE: &str = "documents";

/// Job type of an OCR task
pub const OCR_JOB: &str = "ocr";

const OCR_MIME_TYPE: &str = "application/pdf";

/// Payload of an OCR job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrTask {
    pub document_id: Id,
}

impl OcrTask {
    pub fn new(document_id: Id) -> Self {
        Self { document_id }
    }

    pub fn into_job(self) -> JobResult<Job> {
        Ok(Job::with_payload(OCR_JOB, &self)?.queue(OCR_QUEUE))
    }
}

/// Queues OCR tasks for eligible documents
#[derive(Clone)]
pub struct OcrDispatcher {
    queue: Arc<dyn JobQueue>,
}

impl OcrDispatcher {
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self { queue }
    }

    /// PDFs of OCR-capable owners
    pub fn is_eligible(owner_type: &OwnerType, document: &Document) -> bool {
        owner_type.ocrable && document.mime_type() == Some(OCR_MIME_TYPE)
    }

    /// Enqueue one task
    #[instrument(skip(self))]
    pub async fn dispatch(&self, task: OcrTask) -> DocumentResult<String> {
        let job_id = self.queue.enqueue(task.into_job()?).await?;
        debug!(job_id = %job_id, "OCR task queued");
        Ok(job_id)
    }

    /// Enqueue a task when the document qualifies. The document is returned unchanged.
    pub async fn maybe_dispatch(
        &self,
        owner_type: &OwnerType,
        document: Document,
    ) -> DocumentResult<Document> {
        if Self::is_eligible(owner_type, &document) {
            self.dispatch(OcrTask::new(document.id)).await?;
        }
        Ok(document)
    }

    /// Enqueue every task, logging failures instead of returning them.
    /// Returns the number queued.
    pub async fn dispatch_all(&self, tasks: impl IntoIterator<Item = OcrTask>) -> usize {
        let mut queued = 0;
        for task in tasks {
            match self.dispatch(task).await {
                Ok(_) => queued += 1,
                Err(e) => warn!(
                    document_id = task.document_id,
                    error = %e,
                    "Failed to queue OCR task"
                ),
            }
        }
        queued
    }
}

/// Text extraction backend
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn extract_text(&self, pdf: Bytes) -> Result<String, String>;
}

/// Worker side of an OCR task: extract the text and store it on the document
pub struct OcrJobHandler {
    documents: Arc<DocumentService>,
    engine: Arc<dyn OcrEngine>,
}

impl OcrJobHandler {
    pub fn new(documents: Arc<DocumentService>, engine: Arc<dyn OcrEngine>) -> Self {
        Self { documents, engine }
    }
}

#[async_trait]
impl JobHandler for OcrJobHandler {
    async fn handle(&self, job: &Job) -> JobResult<()> {
        let task: OcrTask = job.payload()?;

        let document = self.documents.show(task.document_id).await.map_err(failed)?;
        let pdf = self.documents.read(&document).await.map_err(failed)?;
        let text = self.engine.extract_text(pdf).await.map_err(failed)?;

        self.documents
            .update_text(document.id, Some(text))
            .await
            .map_err(failed)?;

        info!(document_id = document.id, "OCR text stored");
        Ok(())
    }
}

fn failed(err: impl std::fmt::Display) -> JobError {
    JobError::Failed(err.to_string())
}
