//! State manager messages
//!
//! Commands and responses for the actor pattern.

use thiserror::Error;
use tokio::sync::oneshot;

use crate::domain::{Action, ActionState, Worker};
use crate::queue::{DispatchJob, JobState};

/// Errors from state operations
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Channel error")]
    ChannelError,
}

/// Response from state operations
pub type StateResponse<T> = Result<T, StateError>;

/// Commands sent to the StateManager actor
#[derive(Debug)]
pub enum StateCommand {
    // Action operations
    CreateAction {
        action: Action,
        reply: oneshot::Sender<StateResponse<String>>,
    },
    GetAction {
        uuid: String,
        reply: oneshot::Sender<StateResponse<Option<Action>>>,
    },
    ListActions {
        state_filter: Option<ActionState>,
        reply: oneshot::Sender<StateResponse<Vec<Action>>>,
    },
    /// Targeted update: set worker and PROCESSING where no worker is set yet
    AssignWorker {
        uuid: String,
        worker_id: String,
        reply: oneshot::Sender<StateResponse<usize>>,
    },
    /// Targeted update: set UNPROCESSABLE and cause where no worker is set
    MarkUnprocessable {
        uuid: String,
        cause: String,
        reply: oneshot::Sender<StateResponse<usize>>,
    },

    // Worker operations
    UpsertWorker {
        worker: Worker,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    ListWorkers {
        reachable_only: bool,
        reply: oneshot::Sender<StateResponse<Vec<Worker>>>,
    },
    SetReachable {
        identifier: String,
        reachable: bool,
        reply: oneshot::Sender<StateResponse<usize>>,
    },

    // Dispatch job operations
    InsertJob {
        job: DispatchJob,
        reply: oneshot::Sender<StateResponse<bool>>,
    },
    GetJob {
        key: String,
        reply: oneshot::Sender<StateResponse<Option<DispatchJob>>>,
    },
    ListJobs {
        queue: Option<String>,
        states: Vec<JobState>,
        reply: oneshot::Sender<StateResponse<Vec<DispatchJob>>>,
    },
    CountJobs {
        queue: String,
        states: Vec<JobState>,
        reply: oneshot::Sender<StateResponse<usize>>,
    },
    /// Replace a job only if its stored state is still `expected`
    ReplaceJob {
        job: DispatchJob,
        expected: JobState,
        reply: oneshot::Sender<StateResponse<usize>>,
    },
    /// Delete a job only if its stored state is still `expected`
    DeleteJob {
        key: String,
        expected: JobState,
        reply: oneshot::Sender<StateResponse<usize>>,
    },

    // Shutdown
    Shutdown,
}
