//! Collaborator ports consumed by the scheduler

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::Worker;
use crate::state::StateError;

/// The worker catalogue could not be read
#[derive(Debug, Error)]
#[error("Worker directory unavailable: {0}")]
pub struct DirectoryError(pub String);

/// Read-only view of registered workers
#[async_trait]
pub trait WorkerDirectory: Send + Sync {
    /// Point-in-time list of all registered workers. May be stale.
    async fn snapshot(&self) -> Result<Vec<Worker>, DirectoryError>;
}

/// The two writes the scheduler performs on actions.
///
/// Both are single-row targeted updates guarded on the action having no
/// worker yet; both return the number of rows affected.
#[async_trait]
pub trait ActionStore: Send + Sync {
    /// Record `worker_id` as owner and move the action to PROCESSING
    async fn assign_worker(&self, uuid: &str, worker_id: &str) -> Result<usize, StateError>;

    /// Move the action to UNPROCESSABLE with a human-readable cause
    async fn mark_unprocessable(&self, uuid: &str, cause: &str) -> Result<usize, StateError>;
}
