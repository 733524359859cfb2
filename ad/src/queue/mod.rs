//! Per-worker dispatch queues
//!
//! One logical queue per worker, named by the worker identifier and created
//! lazily on first enqueue. Enqueue is idempotent on the job id. Failed
//! deliveries are retried with exponential backoff up to a bounded number
//! of attempts; jobs that exhaust their attempts stay visible as failed.
//!
//! [`DispatchQueue`] is the producer port the scheduler needs.
//! [`JobLifecycle`] is the consumer/operator side.

mod error;
mod job;
mod memory;
mod store;

use async_trait::async_trait;

pub use error::QueueError;
pub use job::{
    Backoff, DEFAULT_INITIAL_BACKOFF_MS, DEFAULT_MAX_ATTEMPTS, DispatchJob, JobCounts, JobOptions, JobPayload, JobState,
};
pub use memory::InMemoryDispatchQueue;
pub use store::StoreDispatchQueue;

/// Result of an enqueue call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new job was added
    Added,
    /// A job with this id already exists in the queue; nothing was added
    AlreadyPresent,
}

/// Producer side of the per-worker queues
#[async_trait]
pub trait DispatchQueue: Send + Sync {
    /// Add `job` to the queue named `queue`, deduplicating on the job id
    async fn enqueue(&self, queue: &str, job: DispatchJob) -> Result<EnqueueOutcome, QueueError>;

    /// Number of unfinished (waiting, delayed or active) jobs in `queue`
    async fn depth(&self, queue: &str) -> Result<usize, QueueError>;
}

/// Consumer and operator side of the per-worker queues.
///
/// None of these calls touch action state; reconciling actions with job
/// outcomes belongs to the execution consumer.
#[async_trait]
pub trait JobLifecycle: Send + Sync {
    /// Take the next due job (oldest ready time first) and mark it active
    async fn take_next(&self, queue: &str, now: i64) -> Result<Option<DispatchJob>, QueueError>;

    /// Report success for an active job
    async fn complete(&self, queue: &str, job_id: &str) -> Result<(), QueueError>;

    /// Report failure for an active job. Returns the job's new state.
    async fn fail(&self, queue: &str, job_id: &str, reason: &str, now: i64) -> Result<JobState, QueueError>;

    /// Make a delayed job ready immediately
    async fn promote(&self, queue: &str, job_id: &str) -> Result<(), QueueError>;

    /// Re-drive a failed job with a fresh attempt budget
    async fn retry(&self, queue: &str, job_id: &str) -> Result<(), QueueError>;

    /// Remove a job that is not active. Returns false if it did not exist.
    async fn remove(&self, queue: &str, job_id: &str) -> Result<bool, QueueError>;

    /// Look up one job
    async fn get(&self, queue: &str, job_id: &str) -> Result<Option<DispatchJob>, QueueError>;

    /// List jobs, optionally restricted to one queue and one state
    async fn jobs(&self, queue: Option<&str>, state: Option<JobState>) -> Result<Vec<DispatchJob>, QueueError>;

    /// Per-state counts for one queue
    async fn counts(&self, queue: &str) -> Result<JobCounts, QueueError>;
}
