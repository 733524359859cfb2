//! Business outcomes of a scheduling attempt

use crate::queue::EnqueueOutcome;

/// What `schedule` decided for an action.
///
/// None of these are errors: an unprocessable action and a failed enqueue
/// are both recorded states the caller reports, not exceptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// Ownership committed and the job is on the worker's queue
    Dispatched {
        worker_id: String,
        job_id: String,
        enqueue: EnqueueOutcome,
    },

    /// No reachable worker can run the action; it is now UNPROCESSABLE
    Unprocessable { cause: String },

    /// Ownership committed but the queue rejected the job. The action stays
    /// PROCESSING with its worker and needs reconciliation.
    EnqueueFailed { worker_id: String, error: String },
}

impl ScheduleOutcome {
    /// Worker that now owns the action, if one was assigned
    pub fn worker_id(&self) -> Option<&str> {
        match self {
            Self::Dispatched { worker_id, .. } | Self::EnqueueFailed { worker_id, .. } => Some(worker_id),
            Self::Unprocessable { .. } => None,
        }
    }

    pub fn is_dispatched(&self) -> bool {
        matches!(self, Self::Dispatched { .. })
    }
}

impl std::fmt::Display for ScheduleOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dispatched {
                worker_id,
                job_id,
                enqueue: EnqueueOutcome::Added,
            } => write!(f, "dispatched job {} to {}", job_id, worker_id),
            Self::Dispatched {
                worker_id, job_id, ..
            } => write!(f, "job {} already queued on {}", job_id, worker_id),
            Self::Unprocessable { cause } => write!(f, "unprocessable: {}", cause),
            Self::EnqueueFailed { worker_id, error } => {
                write!(f, "assigned to {} but enqueue failed: {}", worker_id, error)
            }
        }
    }
}
