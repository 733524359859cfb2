//! ActionScheduler implementation

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::balancer;
use crate::domain::{Action, NO_CAPABLE_WORKER_CAUSE};
use crate::matcher;
use crate::queue::{DispatchJob, DispatchQueue};

use super::config::SchedulerConfig;
use super::error::SchedulerError;
use super::outcome::ScheduleOutcome;
use super::ports::{ActionStore, WorkerDirectory};

/// Matches an action to one worker, records the ownership and queues the job.
///
/// Holds no mutable state between calls; any number of schedulers may share
/// the same backends.
#[derive(Clone)]
pub struct ActionScheduler {
    config: SchedulerConfig,
    directory: Arc<dyn WorkerDirectory>,
    actions: Arc<dyn ActionStore>,
    queue: Arc<dyn DispatchQueue>,
}

impl ActionScheduler {
    /// Create a new scheduler over the given collaborators
    pub fn new(
        config: SchedulerConfig,
        directory: Arc<dyn WorkerDirectory>,
        actions: Arc<dyn ActionStore>,
        queue: Arc<dyn DispatchQueue>,
    ) -> Self {
        debug!(?config, "ActionScheduler::new: called");
        Self {
            config,
            directory,
            actions,
            queue,
        }
    }

    /// Schedule one action.
    ///
    /// `Err` means the action was not schedulable, infrastructure failed
    /// before any decision was committed, or a guarded write missed.
    /// Everything else, including "no worker fits" and a rejected enqueue,
    /// is an `Ok` outcome.
    ///
    /// Both writes are guarded on the stored action still being PENDING and
    /// unowned, so a stale copy of `action` can never move a stored action
    /// out of a later state.
    pub async fn schedule(&self, action: &Action) -> Result<ScheduleOutcome, SchedulerError> {
        debug!(uuid = %action.uuid, requirements = %action.requirements, "ActionScheduler::schedule: called");
        if !action.is_schedulable() {
            warn!(uuid = %action.uuid, state = %action.state, "ActionScheduler::schedule: action not schedulable");
            return Err(SchedulerError::NotSchedulable {
                uuid: action.uuid.clone(),
                state: action.state,
                worker: action.worker.clone(),
            });
        }
        let requirements = action.requirements;

        let workers = self.directory.snapshot().await?;
        let candidates = matcher::match_workers(&requirements, &workers);
        if candidates.is_empty() {
            debug!(uuid = %action.uuid, workers = workers.len(), "ActionScheduler::schedule: no candidates");
            return self.reject(action).await;
        }

        let chosen = balancer::select_worker(candidates, self.queue.as_ref(), self.config.depth_concurrency)
            .await
            .map_err(SchedulerError::QueueUnavailable)?;
        let Some(chosen) = chosen else {
            return self.reject(action).await;
        };

        let rows = self.actions.assign_worker(&action.uuid, &chosen.identifier).await?;
        if rows != 1 {
            warn!(uuid = %action.uuid, worker = %chosen.identifier, rows, "ActionScheduler::schedule: ownership update missed");
            return Err(SchedulerError::OwnershipUpdate {
                uuid: action.uuid.clone(),
                rows,
            });
        }
        info!(uuid = %action.uuid, worker = %chosen.identifier, hostname = %chosen.hostname, "Action assigned");

        let job = DispatchJob::for_action(action.uuid.clone(), self.config.job_options());
        match self.queue.enqueue(&chosen.identifier, job).await {
            Ok(enqueue) => {
                info!(uuid = %action.uuid, worker = %chosen.identifier, ?enqueue, "Action dispatched");
                Ok(ScheduleOutcome::Dispatched {
                    worker_id: chosen.identifier,
                    job_id: action.uuid.clone(),
                    enqueue,
                })
            }
            Err(e) => {
                // Assignment stands; re-dispatch is left to reconciliation
                error!(
                    uuid = %action.uuid,
                    worker = %chosen.identifier,
                    error = %e,
                    "Enqueue failed after ownership was committed"
                );
                Ok(ScheduleOutcome::EnqueueFailed {
                    worker_id: chosen.identifier,
                    error: e.to_string(),
                })
            }
        }
    }

    async fn reject(&self, action: &Action) -> Result<ScheduleOutcome, SchedulerError> {
        debug!(uuid = %action.uuid, "ActionScheduler::reject: called");
        let rows = self
            .actions
            .mark_unprocessable(&action.uuid, NO_CAPABLE_WORKER_CAUSE)
            .await?;
        if rows != 1 {
            return Err(SchedulerError::StateUpdate {
                uuid: action.uuid.clone(),
                rows,
            });
        }
        warn!(uuid = %action.uuid, requirements = %action.requirements, "Action unprocessable: {}", NO_CAPABLE_WORKER_CAUSE);
        Ok(ScheduleOutcome::Unprocessable {
            cause: NO_CAPABLE_WORKER_CAUSE.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ActionState, ResourceRequirement, Worker};
    use crate::queue::{EnqueueOutcome, InMemoryDispatchQueue, JobLifecycle, JobOptions, QueueError};
    use crate::scheduler::DirectoryError;
    use crate::state::StateError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    struct FixedDirectory(Vec<Worker>);

    #[async_trait]
    impl WorkerDirectory for FixedDirectory {
        async fn snapshot(&self) -> Result<Vec<Worker>, DirectoryError> {
            Ok(self.0.clone())
        }
    }

    struct DownDirectory;

    #[async_trait]
    impl WorkerDirectory for DownDirectory {
        async fn snapshot(&self) -> Result<Vec<Worker>, DirectoryError> {
            Err(DirectoryError("connection refused".to_string()))
        }
    }

    #[derive(Default)]
    struct FakeRow {
        worker: Option<String>,
        state: ActionState,
        cause: Option<String>,
    }

    /// Applies the same PENDING-and-unowned guard as the store
    #[derive(Default)]
    struct FakeActions {
        rows: Mutex<HashMap<String, FakeRow>>,
    }

    impl FakeActions {
        async fn insert(&self, uuid: &str) {
            self.rows.lock().await.insert(uuid.to_string(), FakeRow::default());
        }

        async fn worker_of(&self, uuid: &str) -> Option<String> {
            self.rows.lock().await.get(uuid).and_then(|r| r.worker.clone())
        }

        async fn state_of(&self, uuid: &str) -> Option<ActionState> {
            self.rows.lock().await.get(uuid).map(|r| r.state)
        }

        async fn cause_of(&self, uuid: &str) -> Option<String> {
            self.rows.lock().await.get(uuid).and_then(|r| r.cause.clone())
        }
    }

    fn claimable(row: &FakeRow) -> bool {
        row.worker.is_none() && row.state == ActionState::Pending
    }

    #[async_trait]
    impl ActionStore for FakeActions {
        async fn assign_worker(&self, uuid: &str, worker_id: &str) -> Result<usize, StateError> {
            let mut rows = self.rows.lock().await;
            match rows.get_mut(uuid) {
                Some(row) if claimable(row) => {
                    row.worker = Some(worker_id.to_string());
                    row.state = ActionState::Processing;
                    Ok(1)
                }
                _ => Ok(0),
            }
        }

        async fn mark_unprocessable(&self, uuid: &str, cause: &str) -> Result<usize, StateError> {
            let mut rows = self.rows.lock().await;
            match rows.get_mut(uuid) {
                Some(row) if claimable(row) => {
                    row.state = ActionState::Unprocessable;
                    row.cause = Some(cause.to_string());
                    Ok(1)
                }
                _ => Ok(0),
            }
        }
    }

    struct RejectingQueue;

    #[async_trait]
    impl DispatchQueue for RejectingQueue {
        async fn enqueue(&self, _queue: &str, _job: DispatchJob) -> Result<EnqueueOutcome, QueueError> {
            Err(QueueError::Unavailable("broker offline".to_string()))
        }

        async fn depth(&self, _queue: &str) -> Result<usize, QueueError> {
            Ok(0)
        }
    }

    struct BlindQueue;

    #[async_trait]
    impl DispatchQueue for BlindQueue {
        async fn enqueue(&self, _queue: &str, _job: DispatchJob) -> Result<EnqueueOutcome, QueueError> {
            Ok(EnqueueOutcome::Added)
        }

        async fn depth(&self, queue: &str) -> Result<usize, QueueError> {
            Err(QueueError::Unavailable(format!("cannot count {}", queue)))
        }
    }

    fn workers() -> Vec<Worker> {
        vec![
            Worker::new("W1", "node-1", 4, 16, 0),
            Worker::new("W2", "node-2", 4, 16, 0),
        ]
    }

    fn scheduler(
        directory: Arc<dyn WorkerDirectory>,
        actions: Arc<FakeActions>,
        queue: Arc<dyn DispatchQueue>,
    ) -> ActionScheduler {
        ActionScheduler::new(SchedulerConfig::default(), directory, actions, queue)
    }

    #[tokio::test]
    async fn test_dispatches_to_least_loaded() {
        let queue = Arc::new(InMemoryDispatchQueue::new());
        for uuid in ["old-1", "old-2"] {
            queue
                .enqueue("W1", DispatchJob::for_action(uuid, JobOptions::default()))
                .await
                .unwrap();
        }
        let actions = Arc::new(FakeActions::default());
        let action = Action::with_uuid("a-1", ResourceRequirement::new(2, 8, 0));
        actions.insert(&action.uuid).await;

        let sched = scheduler(Arc::new(FixedDirectory(workers())), actions.clone(), queue.clone());
        let outcome = sched.schedule(&action).await.unwrap();

        assert_eq!(
            outcome,
            ScheduleOutcome::Dispatched {
                worker_id: "W2".to_string(),
                job_id: "a-1".to_string(),
                enqueue: EnqueueOutcome::Added,
            }
        );
        assert_eq!(actions.worker_of("a-1").await.as_deref(), Some("W2"));

        let job = queue.get("W2", "a-1").await.unwrap().unwrap();
        assert_eq!(job.payload.action_uuid, "a-1");
        assert_eq!(job.options, JobOptions::default());
    }

    #[tokio::test]
    async fn test_no_capable_worker_is_outcome() {
        let queue = Arc::new(InMemoryDispatchQueue::new());
        let actions = Arc::new(FakeActions::default());
        let action = Action::with_uuid("a-1", ResourceRequirement::new(64, 512, 80));
        actions.insert(&action.uuid).await;

        let sched = scheduler(Arc::new(FixedDirectory(workers())), actions.clone(), queue.clone());
        let outcome = sched.schedule(&action).await.unwrap();

        assert_eq!(
            outcome,
            ScheduleOutcome::Unprocessable {
                cause: NO_CAPABLE_WORKER_CAUSE.to_string()
            }
        );
        assert_eq!(actions.cause_of("a-1").await.as_deref(), Some(NO_CAPABLE_WORKER_CAUSE));
        assert!(actions.worker_of("a-1").await.is_none());
        assert!(queue.queue_names().await.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_only_is_unprocessable() {
        let queue = Arc::new(InMemoryDispatchQueue::new());
        let actions = Arc::new(FakeActions::default());
        let action = Action::with_uuid("a-1", ResourceRequirement::new(1, 1, 0));
        actions.insert(&action.uuid).await;

        let offline = vec![Worker::new("W1", "big", 128, 1024, 80).with_reachable(false)];
        let sched = scheduler(Arc::new(FixedDirectory(offline)), actions, queue);
        let outcome = sched.schedule(&action).await.unwrap();
        assert!(matches!(outcome, ScheduleOutcome::Unprocessable { .. }));
    }

    #[tokio::test]
    async fn test_directory_failure_leaves_action_untouched() {
        let actions = Arc::new(FakeActions::default());
        let action = Action::with_uuid("a-1", ResourceRequirement::new(1, 1, 0));
        actions.insert(&action.uuid).await;

        let sched = scheduler(Arc::new(DownDirectory), actions.clone(), Arc::new(InMemoryDispatchQueue::new()));
        let err = sched.schedule(&action).await.unwrap_err();

        assert!(matches!(err, SchedulerError::DirectoryUnavailable(_)));
        assert!(err.is_retryable());
        assert!(actions.worker_of("a-1").await.is_none());
        assert!(actions.cause_of("a-1").await.is_none());
    }

    #[tokio::test]
    async fn test_depth_failure_leaves_action_untouched() {
        let actions = Arc::new(FakeActions::default());
        let action = Action::with_uuid("a-1", ResourceRequirement::new(1, 1, 0));
        actions.insert(&action.uuid).await;

        let sched = scheduler(Arc::new(FixedDirectory(workers())), actions.clone(), Arc::new(BlindQueue));
        let err = sched.schedule(&action).await.unwrap_err();

        assert!(matches!(err, SchedulerError::QueueUnavailable(_)));
        assert!(err.is_retryable());
        assert!(actions.worker_of("a-1").await.is_none());
    }

    #[tokio::test]
    async fn test_ownership_miss_skips_enqueue() {
        let queue = Arc::new(InMemoryDispatchQueue::new());
        let actions = Arc::new(FakeActions::default());
        // Action row never created, so the targeted update hits nothing
        let action = Action::with_uuid("ghost", ResourceRequirement::new(1, 1, 0));

        let sched = scheduler(Arc::new(FixedDirectory(workers())), actions, queue.clone());
        let err = sched.schedule(&action).await.unwrap_err();

        assert!(matches!(err, SchedulerError::OwnershipUpdate { rows: 0, .. }));
        assert!(!err.is_retryable());
        assert!(queue.queue_names().await.is_empty());
    }

    #[tokio::test]
    async fn test_enqueue_failure_keeps_assignment() {
        let actions = Arc::new(FakeActions::default());
        let action = Action::with_uuid("a-1", ResourceRequirement::new(1, 1, 0));
        actions.insert(&action.uuid).await;

        let sched = scheduler(Arc::new(FixedDirectory(workers())), actions.clone(), Arc::new(RejectingQueue));
        let outcome = sched.schedule(&action).await.unwrap();

        let ScheduleOutcome::EnqueueFailed { worker_id, error } = outcome else {
            panic!("Expected EnqueueFailed, got {:?}", outcome);
        };
        assert!(error.contains("broker offline"));
        assert_eq!(actions.worker_of("a-1").await, Some(worker_id));
    }

    #[tokio::test]
    async fn test_job_uses_configured_options() {
        let queue = Arc::new(InMemoryDispatchQueue::new());
        let actions = Arc::new(FakeActions::default());
        let action = Action::with_uuid("a-1", ResourceRequirement::new(1, 1, 0));
        actions.insert(&action.uuid).await;

        let config = SchedulerConfig {
            max_attempts: 3,
            initial_backoff_ms: 500,
            ..SchedulerConfig::default()
        };
        let sched = ActionScheduler::new(config, Arc::new(FixedDirectory(workers())), actions, queue.clone());
        let outcome = sched.schedule(&action).await.unwrap();

        let worker = outcome.worker_id().unwrap().to_string();
        let job = queue.get(&worker, "a-1").await.unwrap().unwrap();
        assert_eq!(job.options.max_attempts, 3);
        assert_eq!(job.options.backoff.delay_ms(1), 500);
    }

    #[tokio::test]
    async fn test_non_pending_action_is_refused_before_any_lookup() {
        let queue = Arc::new(InMemoryDispatchQueue::new());
        let actions = Arc::new(FakeActions::default());
        let mut action = Action::with_uuid("a-1", ResourceRequirement::new(1, 1, 0));
        action.state = ActionState::Unprocessable;
        action.state_cause = Some(NO_CAPABLE_WORKER_CAUSE.to_string());
        actions.insert(&action.uuid).await;

        // A directory that fails proves the check runs first
        let sched = scheduler(Arc::new(DownDirectory), actions.clone(), queue.clone());
        let err = sched.schedule(&action).await.unwrap_err();

        assert!(matches!(
            err,
            SchedulerError::NotSchedulable {
                state: ActionState::Unprocessable,
                ..
            }
        ));
        assert!(!err.is_retryable());
        assert!(queue.queue_names().await.is_empty());
    }

    #[tokio::test]
    async fn test_stale_pending_copy_cannot_revive_unprocessable_action() {
        let queue = Arc::new(InMemoryDispatchQueue::new());
        let actions = Arc::new(FakeActions::default());
        let action = Action::with_uuid("a-1", ResourceRequirement::new(2, 8, 0));
        actions.insert(&action.uuid).await;

        let sched = scheduler(Arc::new(FixedDirectory(Vec::new())), actions.clone(), queue.clone());
        assert!(matches!(
            sched.schedule(&action).await.unwrap(),
            ScheduleOutcome::Unprocessable { .. }
        ));

        // Capacity shows up, but the in-memory copy still says PENDING
        let sched = scheduler(Arc::new(FixedDirectory(workers())), actions.clone(), queue.clone());
        let err = sched.schedule(&action).await.unwrap_err();

        assert!(matches!(err, SchedulerError::OwnershipUpdate { rows: 0, .. }));
        assert_eq!(actions.state_of("a-1").await, Some(ActionState::Unprocessable));
        assert_eq!(actions.cause_of("a-1").await.as_deref(), Some(NO_CAPABLE_WORKER_CAUSE));
        assert!(actions.worker_of("a-1").await.is_none());
        assert!(queue.queue_names().await.is_empty());
    }
}
