//! StateManager - actor that owns the DispatchStore
//!
//! Processes commands via channels for thread-safe access to persistent state.

use std::path::Path;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::domain::{Action, ActionState, Filter, IndexValue, Store, Worker, now_ms};
use crate::queue::{DispatchJob, JobState};
use crate::scheduler::{ActionStore, DirectoryError, WorkerDirectory};

use super::messages::{StateCommand, StateError, StateResponse};

/// Handle to send commands to the StateManager
#[derive(Clone)]
pub struct StateManager {
    tx: mpsc::Sender<StateCommand>,
}

impl StateManager {
    /// Spawn a new StateManager actor over the store at `store_path`
    pub fn spawn(store_path: impl AsRef<Path>) -> eyre::Result<Self> {
        debug!(store_path = %store_path.as_ref().display(), "spawn: called");
        let store = Store::open(store_path.as_ref())?;
        Ok(Self::spawn_with_store(store))
    }

    /// Spawn over a private in-memory store
    pub fn spawn_in_memory() -> eyre::Result<Self> {
        debug!("spawn_in_memory: called");
        Ok(Self::spawn_with_store(Store::open_in_memory()?))
    }

    fn spawn_with_store(store: Store) -> Self {
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(actor_loop(store, rx));
        info!("StateManager spawned");
        Self { tx }
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<StateResponse<T>>) -> StateCommand) -> StateResponse<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    // === Action operations ===

    /// Create a new Action record
    pub async fn create_action(&self, action: Action) -> StateResponse<String> {
        debug!(uuid = %action.uuid, state = %action.state, "create_action: called");
        self.request(|reply| StateCommand::CreateAction { action, reply }).await
    }

    /// Get an Action by uuid
    pub async fn get_action(&self, uuid: &str) -> StateResponse<Option<Action>> {
        debug!(%uuid, "get_action: called");
        let uuid = uuid.to_string();
        self.request(|reply| StateCommand::GetAction { uuid, reply }).await
    }

    /// Get an Action by uuid, returning error if not found
    pub async fn get_action_required(&self, uuid: &str) -> StateResponse<Action> {
        debug!(%uuid, "get_action_required: called");
        self.get_action(uuid)
            .await?
            .ok_or_else(|| StateError::NotFound(format!("Action {}", uuid)))
    }

    /// List Actions with an optional state filter
    pub async fn list_actions(&self, state_filter: Option<ActionState>) -> StateResponse<Vec<Action>> {
        debug!(?state_filter, "list_actions: called");
        self.request(|reply| StateCommand::ListActions { state_filter, reply })
            .await
    }

    // === Worker operations ===

    /// Register or refresh a worker
    pub async fn upsert_worker(&self, worker: Worker) -> StateResponse<()> {
        debug!(identifier = %worker.identifier, reachable = worker.reachable, "upsert_worker: called");
        self.request(|reply| StateCommand::UpsertWorker { worker, reply }).await
    }

    /// List workers, optionally only the reachable ones
    pub async fn list_workers(&self, reachable_only: bool) -> StateResponse<Vec<Worker>> {
        debug!(reachable_only, "list_workers: called");
        self.request(|reply| StateCommand::ListWorkers { reachable_only, reply })
            .await
    }

    /// Flip a worker's reachability flag
    pub async fn set_reachable(&self, identifier: &str, reachable: bool) -> StateResponse<()> {
        debug!(%identifier, reachable, "set_reachable: called");
        let id = identifier.to_string();
        let rows = self
            .request(|reply| StateCommand::SetReachable {
                identifier: id,
                reachable,
                reply,
            })
            .await?;
        if rows == 0 {
            return Err(StateError::NotFound(format!("Worker {}", identifier)));
        }
        Ok(())
    }

    // === Dispatch job operations ===

    /// Insert a job unless its key exists. Returns true if inserted.
    pub async fn insert_job(&self, job: DispatchJob) -> StateResponse<bool> {
        debug!(key = %job.key, "insert_job: called");
        self.request(|reply| StateCommand::InsertJob { job, reply }).await
    }

    /// Get a job by `{queue}/{job_id}` key
    pub async fn get_job(&self, key: &str) -> StateResponse<Option<DispatchJob>> {
        debug!(%key, "get_job: called");
        let key = key.to_string();
        self.request(|reply| StateCommand::GetJob { key, reply }).await
    }

    /// List jobs, optionally for one queue; an empty `states` means any state
    pub async fn list_jobs(&self, queue: Option<String>, states: Vec<JobState>) -> StateResponse<Vec<DispatchJob>> {
        debug!(?queue, ?states, "list_jobs: called");
        self.request(|reply| StateCommand::ListJobs { queue, states, reply })
            .await
    }

    /// Count jobs of one queue in the given states
    pub async fn count_jobs(&self, queue: &str, states: Vec<JobState>) -> StateResponse<usize> {
        debug!(%queue, ?states, "count_jobs: called");
        let queue = queue.to_string();
        self.request(|reply| StateCommand::CountJobs { queue, states, reply })
            .await
    }

    /// Replace a job if its stored state is still `expected`. Returns rows affected.
    pub async fn replace_job(&self, job: DispatchJob, expected: JobState) -> StateResponse<usize> {
        debug!(key = %job.key, %expected, new_state = %job.state, "replace_job: called");
        self.request(|reply| StateCommand::ReplaceJob { job, expected, reply })
            .await
    }

    /// Delete a job if its stored state is still `expected`. Returns rows affected.
    pub async fn delete_job(&self, key: &str, expected: JobState) -> StateResponse<usize> {
        debug!(%key, %expected, "delete_job: called");
        let key = key.to_string();
        self.request(|reply| StateCommand::DeleteJob { key, expected, reply })
            .await
    }

    /// Shutdown the StateManager
    pub async fn shutdown(&self) -> Result<(), StateError> {
        debug!("shutdown: called");
        self.tx
            .send(StateCommand::Shutdown)
            .await
            .map_err(|_| StateError::ChannelError)
    }
}

#[async_trait]
impl WorkerDirectory for StateManager {
    async fn snapshot(&self) -> Result<Vec<Worker>, DirectoryError> {
        debug!("StateManager::snapshot: called");
        self.list_workers(false)
            .await
            .map_err(|e| DirectoryError(e.to_string()))
    }
}

#[async_trait]
impl ActionStore for StateManager {
    async fn assign_worker(&self, uuid: &str, worker_id: &str) -> Result<usize, StateError> {
        debug!(%uuid, %worker_id, "StateManager::assign_worker: called");
        let uuid = uuid.to_string();
        let worker_id = worker_id.to_string();
        self.request(|reply| StateCommand::AssignWorker { uuid, worker_id, reply })
            .await
    }

    async fn mark_unprocessable(&self, uuid: &str, cause: &str) -> Result<usize, StateError> {
        debug!(%uuid, %cause, "StateManager::mark_unprocessable: called");
        let uuid = uuid.to_string();
        let cause = cause.to_string();
        self.request(|reply| StateCommand::MarkUnprocessable { uuid, cause, reply })
            .await
    }
}

fn store_err(e: eyre::Report) -> StateError {
    StateError::StoreError(e.to_string())
}

fn state_filter(states: &[JobState]) -> Option<Filter> {
    if states.is_empty() {
        return None;
    }
    let values = states.iter().map(|s| IndexValue::from(s.as_str())).collect();
    Some(Filter::any_of("state", values))
}

/// Guard for the scheduler's writes: the action is still PENDING and unowned
fn unowned_pending() -> [Filter; 2] {
    [
        Filter::is_null("worker"),
        Filter::eq("state", ActionState::Pending.to_string()),
    ]
}

/// The actor loop that processes commands
async fn actor_loop(mut store: Store, mut rx: mpsc::Receiver<StateCommand>) {
    debug!("StateManager actor started");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            // Action operations
            StateCommand::CreateAction { action, reply } => {
                debug!(uuid = %action.uuid, "actor_loop: CreateAction command");
                let _ = reply.send(store.create(action).map_err(store_err));
            }

            StateCommand::GetAction { uuid, reply } => {
                debug!(%uuid, "actor_loop: GetAction command");
                let _ = reply.send(store.get(&uuid).map_err(store_err));
            }

            StateCommand::ListActions { state_filter, reply } => {
                debug!(?state_filter, "actor_loop: ListActions command");
                let filters: Vec<Filter> = state_filter
                    .map(|s| Filter::eq("state", s.to_string()))
                    .into_iter()
                    .collect();
                let _ = reply.send(store.list(&filters).map_err(store_err));
            }

            StateCommand::AssignWorker { uuid, worker_id, reply } => {
                debug!(%uuid, %worker_id, "actor_loop: AssignWorker command");
                let fields = [
                    ("worker", json!(worker_id)),
                    ("state", json!(ActionState::Processing)),
                    ("updated_at", json!(now_ms())),
                ];
                let result = store
                    .update_fields::<Action>(&uuid, &fields, &unowned_pending())
                    .map_err(store_err);
                let _ = reply.send(result);
            }

            StateCommand::MarkUnprocessable { uuid, cause, reply } => {
                debug!(%uuid, "actor_loop: MarkUnprocessable command");
                let fields = [
                    ("state", json!(ActionState::Unprocessable)),
                    ("state_cause", json!(cause)),
                    ("updated_at", json!(now_ms())),
                ];
                let result = store
                    .update_fields::<Action>(&uuid, &fields, &unowned_pending())
                    .map_err(store_err);
                let _ = reply.send(result);
            }

            // Worker operations
            StateCommand::UpsertWorker { worker, reply } => {
                debug!(identifier = %worker.identifier, "actor_loop: UpsertWorker command");
                let _ = reply.send(store.upsert(&worker).map_err(store_err));
            }

            StateCommand::ListWorkers { reachable_only, reply } => {
                debug!(reachable_only, "actor_loop: ListWorkers command");
                let filters = if reachable_only {
                    vec![Filter::eq("reachable", true)]
                } else {
                    Vec::new()
                };
                let _ = reply.send(store.list::<Worker>(&filters).map_err(store_err));
            }

            StateCommand::SetReachable {
                identifier,
                reachable,
                reply,
            } => {
                debug!(%identifier, reachable, "actor_loop: SetReachable command");
                let fields = [("reachable", json!(reachable)), ("updated_at", json!(now_ms()))];
                let result = store
                    .update_fields::<Worker>(&identifier, &fields, &[])
                    .map_err(store_err);
                let _ = reply.send(result);
            }

            // Dispatch job operations
            StateCommand::InsertJob { job, reply } => {
                debug!(key = %job.key, "actor_loop: InsertJob command");
                let _ = reply.send(store.insert_if_absent(&job).map_err(store_err));
            }

            StateCommand::GetJob { key, reply } => {
                debug!(%key, "actor_loop: GetJob command");
                let _ = reply.send(store.get(&key).map_err(store_err));
            }

            StateCommand::ListJobs { queue, states, reply } => {
                debug!(?queue, ?states, "actor_loop: ListJobs command");
                let mut filters: Vec<Filter> = queue.map(|q| Filter::eq("queue", q)).into_iter().collect();
                filters.extend(state_filter(&states));
                let _ = reply.send(store.list::<DispatchJob>(&filters).map_err(store_err));
            }

            StateCommand::CountJobs { queue, states, reply } => {
                debug!(%queue, ?states, "actor_loop: CountJobs command");
                let mut filters = vec![Filter::eq("queue", queue)];
                filters.extend(state_filter(&states));
                let _ = reply.send(store.count::<DispatchJob>(&filters).map_err(store_err));
            }

            StateCommand::ReplaceJob { job, expected, reply } => {
                debug!(key = %job.key, %expected, "actor_loop: ReplaceJob command");
                let guard = Filter::eq("state", expected.as_str());
                let _ = reply.send(store.replace_where(&job, &[guard]).map_err(store_err));
            }

            StateCommand::DeleteJob { key, expected, reply } => {
                debug!(%key, %expected, "actor_loop: DeleteJob command");
                let guard = Filter::eq("state", expected.as_str());
                let _ = reply.send(store.delete_where::<DispatchJob>(&key, &[guard]).map_err(store_err));
            }

            StateCommand::Shutdown => {
                debug!("actor_loop: Shutdown command");
                info!("StateManager shutting down");
                break;
            }
        }
    }

    debug!("StateManager actor stopped");
}
