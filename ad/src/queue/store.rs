//! Queue backend persisted through the StateManager
//!
//! Every transition is a guarded replace on the job's previous state, so a
//! concurrent writer that got there first turns into a `Conflict` instead of
//! a lost update.

use async_trait::async_trait;
use tracing::{debug, warn};

use dispatchstore::now_ms;

use crate::state::{StateError, StateManager};

use super::error::QueueError;
use super::job::{DispatchJob, JobCounts, JobState};
use super::{DispatchQueue, EnqueueOutcome, JobLifecycle};

/// Dispatch queues stored as `dispatch_jobs` records keyed `{queue}/{job_id}`
#[derive(Clone)]
pub struct StoreDispatchQueue {
    state: StateManager,
}

impl StoreDispatchQueue {
    pub fn new(state: StateManager) -> Self {
        Self { state }
    }

    async fn load(&self, queue: &str, job_id: &str) -> Result<DispatchJob, QueueError> {
        self.state
            .get_job(&DispatchJob::key_for(queue, job_id))
            .await?
            .ok_or_else(|| QueueError::NotFound {
                queue: queue.to_string(),
                job_id: job_id.to_string(),
            })
    }

    /// Persist `job` if the stored copy is still in `expected`
    async fn commit(&self, job: DispatchJob, expected: JobState) -> Result<(), QueueError> {
        let job_id = job.job_id.clone();
        match self.state.replace_job(job, expected).await? {
            1 => Ok(()),
            rows => {
                warn!(%job_id, %expected, rows, "StoreDispatchQueue::commit: guard did not match");
                Err(QueueError::Conflict { job_id })
            }
        }
    }

    /// Delete `job` if the stored copy is still in `expected`
    async fn discard(&self, job: &DispatchJob, expected: JobState) -> Result<(), QueueError> {
        match self.state.delete_job(&job.key, expected).await? {
            1 => Ok(()),
            rows => {
                warn!(job_id = %job.job_id, %expected, rows, "StoreDispatchQueue::discard: guard did not match");
                Err(QueueError::Conflict {
                    job_id: job.job_id.clone(),
                })
            }
        }
    }
}

impl From<StateError> for QueueError {
    fn from(err: StateError) -> Self {
        QueueError::Unavailable(err.to_string())
    }
}

#[async_trait]
impl DispatchQueue for StoreDispatchQueue {
    async fn enqueue(&self, queue: &str, job: DispatchJob) -> Result<EnqueueOutcome, QueueError> {
        debug!(%queue, job_id = %job.job_id, "StoreDispatchQueue::enqueue: called");
        let job = job.into_queue(queue);
        if self.state.insert_job(job).await? {
            Ok(EnqueueOutcome::Added)
        } else {
            debug!(%queue, "StoreDispatchQueue::enqueue: duplicate job id");
            Ok(EnqueueOutcome::AlreadyPresent)
        }
    }

    async fn depth(&self, queue: &str) -> Result<usize, QueueError> {
        debug!(%queue, "StoreDispatchQueue::depth: called");
        Ok(self.state.count_jobs(queue, JobState::LIVE.to_vec()).await?)
    }
}

#[async_trait]
impl JobLifecycle for StoreDispatchQueue {
    async fn take_next(&self, queue: &str, now: i64) -> Result<Option<DispatchJob>, QueueError> {
        debug!(%queue, now, "StoreDispatchQueue::take_next: called");
        let mut due: Vec<DispatchJob> = self
            .state
            .list_jobs(Some(queue.to_string()), vec![JobState::Waiting, JobState::Delayed])
            .await?
            .into_iter()
            .filter(|j| j.is_due(now))
            .collect();
        due.sort_by_key(|j| j.ready_at);

        for mut job in due {
            let previous = job.state;
            job.start(now)?;
            if self.state.replace_job(job.clone(), previous).await? == 1 {
                debug!(%queue, job_id = %job.job_id, "StoreDispatchQueue::take_next: job started");
                return Ok(Some(job));
            }
            debug!(%queue, job_id = %job.job_id, "StoreDispatchQueue::take_next: lost race, trying next");
        }
        Ok(None)
    }

    async fn complete(&self, queue: &str, job_id: &str) -> Result<(), QueueError> {
        debug!(%queue, %job_id, "StoreDispatchQueue::complete: called");
        let mut job = self.load(queue, job_id).await?;
        job.complete(now_ms())?;

        if job.options.remove_on_complete {
            self.discard(&job, JobState::Active).await
        } else {
            self.commit(job, JobState::Active).await
        }
    }

    async fn fail(&self, queue: &str, job_id: &str, reason: &str, now: i64) -> Result<JobState, QueueError> {
        debug!(%queue, %job_id, %reason, "StoreDispatchQueue::fail: called");
        let mut job = self.load(queue, job_id).await?;
        let state = job.fail(reason, now)?;

        if state == JobState::Failed && job.options.remove_on_fail {
            self.discard(&job, JobState::Active).await?;
        } else {
            self.commit(job, JobState::Active).await?;
        }
        Ok(state)
    }

    async fn promote(&self, queue: &str, job_id: &str) -> Result<(), QueueError> {
        debug!(%queue, %job_id, "StoreDispatchQueue::promote: called");
        let mut job = self.load(queue, job_id).await?;
        job.promote(now_ms())?;
        self.commit(job, JobState::Delayed).await
    }

    async fn retry(&self, queue: &str, job_id: &str) -> Result<(), QueueError> {
        debug!(%queue, %job_id, "StoreDispatchQueue::retry: called");
        let mut job = self.load(queue, job_id).await?;
        job.retry(now_ms())?;
        self.commit(job, JobState::Failed).await
    }

    async fn remove(&self, queue: &str, job_id: &str) -> Result<bool, QueueError> {
        debug!(%queue, %job_id, "StoreDispatchQueue::remove: called");
        let Some(job) = self.state.get_job(&DispatchJob::key_for(queue, job_id)).await? else {
            return Ok(false);
        };
        if job.state == JobState::Active {
            return Err(QueueError::Active {
                job_id: job_id.to_string(),
            });
        }
        self.discard(&job, job.state).await?;
        Ok(true)
    }

    async fn get(&self, queue: &str, job_id: &str) -> Result<Option<DispatchJob>, QueueError> {
        debug!(%queue, %job_id, "StoreDispatchQueue::get: called");
        Ok(self.state.get_job(&DispatchJob::key_for(queue, job_id)).await?)
    }

    async fn jobs(&self, queue: Option<&str>, state: Option<JobState>) -> Result<Vec<DispatchJob>, QueueError> {
        debug!(?queue, ?state, "StoreDispatchQueue::jobs: called");
        let mut jobs = self
            .state
            .list_jobs(queue.map(str::to_string), state.into_iter().collect())
            .await?;
        jobs.sort_by(|a, b| a.queue.cmp(&b.queue));
        Ok(jobs)
    }

    async fn counts(&self, queue: &str) -> Result<JobCounts, QueueError> {
        debug!(%queue, "StoreDispatchQueue::counts: called");
        let mut counts = JobCounts::default();
        for job in self.state.list_jobs(Some(queue.to_string()), Vec::new()).await? {
            counts.add(job.state);
        }
        Ok(counts)
    }
}
