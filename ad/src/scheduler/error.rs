//! Scheduler error types

use thiserror::Error;

use crate::domain::ActionState;
use crate::queue::QueueError;
use crate::state::StateError;

use super::ports::DirectoryError;

/// Infrastructure failures while scheduling an action
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Worker catalogue could not be read; the action is untouched
    #[error(transparent)]
    DirectoryUnavailable(#[from] DirectoryError),

    /// Queue depths could not be read; the action is untouched
    #[error("Queue backend unavailable while balancing: {0}")]
    QueueUnavailable(#[source] QueueError),

    /// The action was not PENDING and unowned when handed to the scheduler
    #[error("Action {uuid} is not schedulable (state {state}, worker {worker:?})")]
    NotSchedulable {
        uuid: String,
        state: ActionState,
        worker: Option<String>,
    },

    /// The targeted ownership update did not affect exactly one row
    #[error("Ownership update for action {uuid} affected {rows} rows")]
    OwnershipUpdate { uuid: String, rows: usize },

    /// Marking the action unprocessable did not affect exactly one row
    #[error("State update for action {uuid} affected {rows} rows")]
    StateUpdate { uuid: String, rows: usize },

    /// Action store could not be reached
    #[error("Action store error: {0}")]
    Store(#[from] StateError),
}

impl SchedulerError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            SchedulerError::DirectoryUnavailable(_) => true,
            SchedulerError::QueueUnavailable(_) => true,
            SchedulerError::Store(_) => true,
            SchedulerError::NotSchedulable { .. } => false,
            SchedulerError::OwnershipUpdate { .. } => false,
            SchedulerError::StateUpdate { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        assert!(SchedulerError::DirectoryUnavailable(DirectoryError("db down".to_string())).is_retryable());
        assert!(SchedulerError::QueueUnavailable(QueueError::Unavailable("redis".to_string())).is_retryable());
        assert!(SchedulerError::Store(StateError::ChannelError).is_retryable());
        assert!(
            !SchedulerError::OwnershipUpdate {
                uuid: "a".to_string(),
                rows: 0
            }
            .is_retryable()
        );
        assert!(
            !SchedulerError::StateUpdate {
                uuid: "a".to_string(),
                rows: 0
            }
            .is_retryable()
        );
        assert!(
            !SchedulerError::NotSchedulable {
                uuid: "a".to_string(),
                state: ActionState::Unprocessable,
                worker: None,
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_display() {
        let err = SchedulerError::OwnershipUpdate {
            uuid: "a-1".to_string(),
            rows: 0,
        };
        assert_eq!(err.to_string(), "Ownership update for action a-1 affected 0 rows");

        let err = SchedulerError::from(DirectoryError("timeout".to_string()));
        assert_eq!(err.to_string(), "Worker directory unavailable: timeout");

        let err = SchedulerError::NotSchedulable {
            uuid: "a-1".to_string(),
            state: ActionState::Processing,
            worker: Some("w1".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Action a-1 is not schedulable (state processing, worker Some(\"w1\"))"
        );
    }
}
