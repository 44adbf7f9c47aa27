//! Background Job Queue

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dm_core::DmError;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

/// Job errors
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job not found: {0}")]
    NotFound(String),
    #[error("Job failed: {0}")]
    Failed(String),
    #[error("Queue error: {0}")]
    QueueError(String),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type JobResult<T> = Result<T, JobError>;

impl From<JobError> for DmError {
    fn from(err: JobError) -> Self {
        DmError::Queue(err.to_string())
    }
}

/// Job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Retrying,
    Dead,
}

/// Job priority
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
}

/// A background job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID
    pub id: String,
    /// Job type, used to route to a handler
    pub job_type: String,
    /// Queue name
    pub queue: String,
    /// Job arguments (JSON)
    pub args: serde_json::Value,
    /// Current status
    pub status: JobStatus,
    /// Priority
    pub priority: JobPriority,
    /// Number of retry attempts
    pub retries: u32,
    /// Maximum retries allowed
    pub max_retries: u32,
    /// Error message (if failed)
    pub error: Option<String>,
    /// When to run (for scheduled jobs)
    pub run_at: Option<DateTime<Utc>>,
    /// When the job was created
    pub created_at: DateTime<Utc>,
    /// When the job started running
    pub started_at: Option<DateTime<Utc>>,
    /// When the job completed/failed
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(job_type: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            job_type: job_type.into(),
            queue: "default".to_string(),
            args,
            status: JobStatus::Pending,
            priority: JobPriority::Normal,
            retries: 0,
            max_retries: 3,
            error: None,
            run_at: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Create a job whose arguments are a serialized payload
    pub fn with_payload<T: Serialize>(job_type: impl Into<String>, payload: &T) -> JobResult<Self> {
        Ok(Self::new(job_type, serde_json::to_value(payload)?))
    }

    /// Deserialize the job arguments
    pub fn payload<T: DeserializeOwned>(&self) -> JobResult<T> {
        Ok(serde_json::from_value(self.args.clone())?)
    }

    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    pub fn priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    /// Schedule in N seconds
    pub fn run_in(mut self, seconds: i64) -> Self {
        self.run_at = Some(Utc::now() + chrono::Duration::seconds(seconds));
        self
    }

    /// Check if the job is ready to run
    pub fn is_ready(&self) -> bool {
        match self.run_at {
            Some(at) => Utc::now() >= at,
            None => true,
        }
    }

    pub fn can_retry(&self) -> bool {
        self.retries < self.max_retries
    }

    pub fn mark_running(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self) {
        self.status = JobStatus::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());

        if self.can_retry() {
            self.status = JobStatus::Retrying;
            self.retries += 1;
            // Exponential backoff: 2^retries minutes
            let delay = 2_i64.pow(self.retries) * 60;
            self.run_at = Some(Utc::now() + chrono::Duration::seconds(delay));
        } else {
            self.status = JobStatus::Dead;
        }
    }
}

/// Job queue trait
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a job
    async fn enqueue(&self, job: Job) -> JobResult<String>;

    /// Get a job by ID
    async fn get(&self, job_id: &str) -> JobResult<Option<Job>>;

    /// Dequeue the next ready job
    async fn dequeue(&self, queue: &str) -> JobResult<Option<Job>>;

    /// Update a job
    async fn update(&self, job: &Job) -> JobResult<()>;

    /// Get pending job count
    async fn pending_count(&self, queue: &str) -> JobResult<usize>;

    /// Get all jobs for a queue
    async fn list(&self, queue: &str, status: Option<JobStatus>) -> JobResult<Vec<Job>>;
}

/// In-memory job queue for development/testing
pub struct MemoryJobQueue {
    jobs: RwLock<HashMap<String, Job>>,
}

impl Default for MemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: Job) -> JobResult<String> {
        let mut jobs = self.jobs.write().await;
        let id = job.id.clone();
        jobs.insert(id.clone(), job);
        Ok(id)
    }

    async fn get(&self, job_id: &str) -> JobResult<Option<Job>> {
        let jobs = self.jobs.read().await;
        Ok(jobs.get(job_id).cloned())
    }

    async fn dequeue(&self, queue: &str) -> JobResult<Option<Job>> {
        let mut jobs = self.jobs.write().await;

        // Highest priority first, oldest first within a priority
        let job_id = jobs
            .values()
            .filter(|j| {
                j.queue == queue
                    && matches!(j.status, JobStatus::Pending | JobStatus::Retrying)
                    && j.is_ready()
            })
            .max_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then_with(|| b.created_at.cmp(&a.created_at))
            })
            .map(|j| j.id.clone());

        if let Some(id) = job_id {
            if let Some(job) = jobs.get_mut(&id) {
                job.mark_running();
                return Ok(Some(job.clone()));
            }
        }

        Ok(None)
    }

    async fn update(&self, job: &Job) -> JobResult<()> {
        let mut jobs = self.jobs.write().await;
        if !jobs.contains_key(&job.id) {
            return Err(JobError::NotFound(job.id.clone()));
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn pending_count(&self, queue: &str) -> JobResult<usize> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .values()
            .filter(|j| j.queue == queue && j.status == JobStatus::Pending)
            .count())
    }

    async fn list(&self, queue: &str, status: Option<JobStatus>) -> JobResult<Vec<Job>> {
        let jobs = self.jobs.read().await;
        let mut listed: Vec<Job> = jobs
            .values()
            .filter(|j| j.queue == queue && status.map_or(true, |s| j.status == s))
            .cloned()
            .collect();
        listed.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(listed)
    }
}
