//! # dm-jobs
//!
//! Background job queue for Documents RS.
//!
//! Jobs are enqueued by the domain crates (OCR extraction) and picked up by
//! a [`JobWorker`] that routes each job type to its [`JobHandler`].

pub mod jobs;
pub mod worker;

pub use jobs::{Job, JobError, JobPriority, JobQueue, JobResult, JobStatus, MemoryJobQueue};
pub use worker::{JobHandler, JobWorker};
