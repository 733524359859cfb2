//! Queue error types

use thiserror::Error;

use super::job::JobState;

/// Errors from dispatch queue backends
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue backend unavailable: {0}")]
    Unavailable(String),

    #[error("Job {job_id} not found in queue {queue}")]
    NotFound { queue: String, job_id: String },

    #[error("Job {job_id} cannot move from {from} to {to}")]
    InvalidTransition { job_id: String, from: JobState, to: JobState },

    #[error("Job {job_id} is active and cannot be removed")]
    Active { job_id: String },

    #[error("Job {job_id} was changed concurrently")]
    Conflict { job_id: String },
}

impl QueueError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            QueueError::Unavailable(_) => true,
            QueueError::Conflict { .. } => true,
            QueueError::NotFound { .. } => false,
            QueueError::InvalidTransition { .. } => false,
            QueueError::Active { .. } => false,
        }
    }
}
