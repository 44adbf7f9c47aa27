//! # dm-documents
//!
//! Documents attached to arbitrary owner records.
//!
//! ## Features
//!
//! - Polymorphic owner references resolved through an [`OwnerRegistry`]
//! - All-or-nothing batch uploads with per-owner duplicate name checks
//! - Search and ordering over an owner's documents
//! - OCR dispatch for PDFs of OCR-capable owners
//! - Restrict / cascade handling when an owner is deleted
//!
//! ## Example
//!
//! ```rust,ignore
//! use dm_documents::{MemoryDocumentStore, OcrDispatcher, OwnerRegistry, OwnerType, UploadOrchestrator};
//!
//! let registry = Arc::new(OwnerRegistry::new().register(OwnerType::new("Invoice", "invoices").ocrable()));
//! let uploads = UploadOrchestrator::new(store, registry, files, OcrDispatcher::new(queue))
//!     .configure(&config.documents);
//!
//! let documents = uploads
//!     .store("Invoice", 7, vec![UploadedFile::new("scan.pdf", bytes)])
//!     .await?;
//! ```

pub mod error;
pub mod lifecycle;
pub mod memory;
pub mod model;
pub mod ocr;
pub mod query;
pub mod registry;
pub mod service;
pub mod store;
pub mod upload;

pub use error::{DocumentError, DocumentResult, StoreError};
pub use lifecycle::OwnerLifecycleGuard;
pub use memory::{MemoryDocumentStore, MemoryTransaction};
pub use model::{Document, OwnerRef};
pub use ocr::{OcrDispatcher, OcrEngine, OcrJobHandler, OcrTask, OCR_JOB, OCR_QUEUE};
pub use query::{like, DocumentQuery};
pub use registry::{Documentable, OwnerRegistry, OwnerType};
pub use service::DocumentService;
pub use store::{DocumentStore, DocumentTransaction};
pub use upload::UploadOrchestrator;
