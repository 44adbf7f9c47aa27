//! Job worker
//!
//! Pulls jobs off one queue and hands each to the handler registered for
//! its job type.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::jobs::{Job, JobQueue, JobResult};

/// Handler for a specific job type
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> JobResult<()>;
}

/// Job worker for processing jobs
pub struct JobWorker {
    queue: Arc<dyn JobQueue>,
    queue_name: String,
    handlers: HashMap<String, Box<dyn JobHandler>>,
    idle_interval: Duration,
}

impl JobWorker {
    pub fn new(queue: Arc<dyn JobQueue>, queue_name: impl Into<String>) -> Self {
        Self {
            queue,
            queue_name: queue_name.into(),
            handlers: HashMap::new(),
            idle_interval: Duration::from_millis(100),
        }
    }

    /// Register a handler for a job type
    pub fn register<H: JobHandler + 'static>(&mut self, job_type: impl Into<String>, handler: H) {
        self.handlers.insert(job_type.into(), Box::new(handler));
    }

    pub fn idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval = interval;
        self
    }

    /// Process one job (returns true if a job was processed)
    pub async fn process_one(&self) -> JobResult<bool> {
        let mut job = match self.queue.dequeue(&self.queue_name).await? {
            Some(job) => job,
            None => return Ok(false),
        };

        let Some(handler) = self.handlers.get(&job.job_type) else {
            warn!(job_id = %job.id, job_type = %job.job_type, "No handler for job type");
            job.mark_failed(format!("Unknown job type: {}", job.job_type));
            self.queue.update(&job).await?;
            return Ok(true);
        };

        match handler.handle(&job).await {
            Ok(()) => {
                debug!(job_id = %job.id, job_type = %job.job_type, "Job completed");
                job.mark_completed();
            }
            Err(e) => {
                warn!(job_id = %job.id, job_type = %job.job_type, error = %e, "Job failed");
                job.mark_failed(e.to_string());
            }
        }

        self.queue.update(&job).await?;
        Ok(true)
    }

    /// Run the worker loop until the shutdown flag flips to true
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            let wait = match self.process_one().await {
                Ok(true) => continue,
                Ok(false) => self.idle_interval,
                Err(e) => {
                    error!("Job worker error: {}", e);
                    Duration::from_secs(1)
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.changed() => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{JobError, JobStatus, MemoryJobQueue};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl JobHandler for CountingHandler {
        async fn handle(&self, _job: &Job) -> JobResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(JobError::Failed("boom".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_process_one_completes_job() {
        let queue = Arc::new(MemoryJobQueue::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let mut worker = JobWorker::new(queue.clone(), "default");
        worker.register(
            "count",
            CountingHandler {
                calls: calls.clone(),
                fail: false,
            },
        );

        let id = queue
            .enqueue(Job::new("count", serde_json::json!({})))
            .await
            .unwrap();

        assert!(worker.process_one().await.unwrap());
        assert!(!worker.process_one().await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let job = queue.get(&id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_failed_job_is_retried_later() {
        let queue = Arc::new(MemoryJobQueue::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let mut worker = JobWorker::new(queue.clone(), "default");
        worker.register(
            "count",
            CountingHandler {
                calls: calls.clone(),
                fail: true,
            },
        );

        let id = queue
            .enqueue(Job::new("count", serde_json::json!({})))
            .await
            .unwrap();
        worker.process_one().await.unwrap();

        let job = queue.get(&id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Retrying);
        assert_eq!(job.error.as_deref(), Some("Job failed: boom"));
    }

    #[tokio::test]
    async fn test_unknown_job_type() {
        let queue = Arc::new(MemoryJobQueue::new());
        let worker = JobWorker::new(queue.clone(), "default");

        let id = queue
            .enqueue(Job::new("mystery", serde_json::json!({})).max_retries(0))
            .await
            .unwrap();
        worker.process_one().await.unwrap();

        let job = queue.get(&id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Dead);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let queue = Arc::new(MemoryJobQueue::new());
        let worker = JobWorker::new(queue, "default").idle_interval(Duration::from_millis(5));
        let (tx, rx) = tokio::sync::watch::channel(false);

        let handle = tokio::spawn(async move { worker.run(rx).await });
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
