//! In-process queue backend

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use dispatchstore::now_ms;

use super::error::QueueError;
use super::job::{DispatchJob, JobCounts, JobState};
use super::{DispatchQueue, EnqueueOutcome, JobLifecycle};

/// Queues held in memory, one `Vec` per worker in insertion order
#[derive(Default)]
pub struct InMemoryDispatchQueue {
    queues: Mutex<HashMap<String, Vec<DispatchJob>>>,
}

impl InMemoryDispatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the queues created so far
    pub async fn queue_names(&self) -> Vec<String> {
        let queues = self.queues.lock().await;
        let mut names: Vec<String> = queues.keys().cloned().collect();
        names.sort();
        names
    }
}

fn not_found(queue: &str, job_id: &str) -> QueueError {
    QueueError::NotFound {
        queue: queue.to_string(),
        job_id: job_id.to_string(),
    }
}

fn find_mut<'a>(
    queues: &'a mut HashMap<String, Vec<DispatchJob>>,
    queue: &str,
    job_id: &str,
) -> Result<&'a mut DispatchJob, QueueError> {
    queues
        .get_mut(queue)
        .and_then(|jobs| jobs.iter_mut().find(|j| j.job_id == job_id))
        .ok_or_else(|| not_found(queue, job_id))
}

#[async_trait]
impl DispatchQueue for InMemoryDispatchQueue {
    async fn enqueue(&self, queue: &str, job: DispatchJob) -> Result<EnqueueOutcome, QueueError> {
        debug!(%queue, job_id = %job.job_id, "InMemoryDispatchQueue::enqueue: called");
        let mut queues = self.queues.lock().await;
        let jobs = queues.entry(queue.to_string()).or_default();

        if jobs.iter().any(|j| j.job_id == job.job_id) {
            debug!(%queue, job_id = %job.job_id, "InMemoryDispatchQueue::enqueue: duplicate job id");
            return Ok(EnqueueOutcome::AlreadyPresent);
        }

        jobs.push(job.into_queue(queue));
        Ok(EnqueueOutcome::Added)
    }

    async fn depth(&self, queue: &str) -> Result<usize, QueueError> {
        debug!(%queue, "InMemoryDispatchQueue::depth: called");
        let queues = self.queues.lock().await;
        Ok(queues
            .get(queue)
            .map(|jobs| jobs.iter().filter(|j| j.state.is_live()).count())
            .unwrap_or(0))
    }
}

#[async_trait]
impl JobLifecycle for InMemoryDispatchQueue {
    async fn take_next(&self, queue: &str, now: i64) -> Result<Option<DispatchJob>, QueueError> {
        debug!(%queue, now, "InMemoryDispatchQueue::take_next: called");
        let mut queues = self.queues.lock().await;
        let Some(jobs) = queues.get_mut(queue) else {
            return Ok(None);
        };

        let next = jobs
            .iter_mut()
            .filter(|j| j.is_due(now))
            .min_by_key(|j| j.ready_at);

        match next {
            Some(job) => {
                job.start(now)?;
                debug!(%queue, job_id = %job.job_id, "InMemoryDispatchQueue::take_next: job started");
                Ok(Some(job.clone()))
            }
            None => Ok(None),
        }
    }

    async fn complete(&self, queue: &str, job_id: &str) -> Result<(), QueueError> {
        debug!(%queue, %job_id, "InMemoryDispatchQueue::complete: called");
        let mut queues = self.queues.lock().await;
        let job = find_mut(&mut queues, queue, job_id)?;
        job.complete(now_ms())?;

        if job.options.remove_on_complete {
            debug!(%queue, %job_id, "InMemoryDispatchQueue::complete: removing completed job");
            if let Some(jobs) = queues.get_mut(queue) {
                jobs.retain(|j| j.job_id != job_id);
            }
        }
        Ok(())
    }

    async fn fail(&self, queue: &str, job_id: &str, reason: &str, now: i64) -> Result<JobState, QueueError> {
        debug!(%queue, %job_id, %reason, "InMemoryDispatchQueue::fail: called");
        let mut queues = self.queues.lock().await;
        let job = find_mut(&mut queues, queue, job_id)?;
        let state = job.fail(reason, now)?;

        if state == JobState::Failed && job.options.remove_on_fail {
            debug!(%queue, %job_id, "InMemoryDispatchQueue::fail: removing failed job");
            if let Some(jobs) = queues.get_mut(queue) {
                jobs.retain(|j| j.job_id != job_id);
            }
        }
        Ok(state)
    }

    async fn promote(&self, queue: &str, job_id: &str) -> Result<(), QueueError> {
        debug!(%queue, %job_id, "InMemoryDispatchQueue::promote: called");
        let mut queues = self.queues.lock().await;
        find_mut(&mut queues, queue, job_id)?.promote(now_ms())
    }

    async fn retry(&self, queue: &str, job_id: &str) -> Result<(), QueueError> {
        debug!(%queue, %job_id, "InMemoryDispatchQueue::retry: called");
        let mut queues = self.queues.lock().await;
        find_mut(&mut queues, queue, job_id)?.retry(now_ms())
    }

    async fn remove(&self, queue: &str, job_id: &str) -> Result<bool, QueueError> {
        debug!(%queue, %job_id, "InMemoryDispatchQueue::remove: called");
        let mut queues = self.queues.lock().await;
        let Some(jobs) = queues.get_mut(queue) else {
            return Ok(false);
        };

        match jobs.iter().position(|j| j.job_id == job_id) {
            Some(idx) if jobs[idx].state == JobState::Active => Err(QueueError::Active {
                job_id: job_id.to_string(),
            }),
            Some(idx) => {
                jobs.remove(idx);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get(&self, queue: &str, job_id: &str) -> Result<Option<DispatchJob>, QueueError> {
        debug!(%queue, %job_id, "InMemoryDispatchQueue::get: called");
        let queues = self.queues.lock().await;
        Ok(queues
            .get(queue)
            .and_then(|jobs| jobs.iter().find(|j| j.job_id == job_id))
            .cloned())
    }

    async fn jobs(&self, queue: Option<&str>, state: Option<JobState>) -> Result<Vec<DispatchJob>, QueueError> {
        debug!(?queue, ?state, "InMemoryDispatchQueue::jobs: called");
        let queues = self.queues.lock().await;

        let mut names: Vec<&String> = queues.keys().filter(|name| queue.is_none_or(|q| q == name.as_str())).collect();
        names.sort();

        Ok(names
            .into_iter()
            .flat_map(|name| queues[name].iter())
            .filter(|j| state.is_none_or(|s| j.state == s))
            .cloned()
            .collect())
    }

    async fn counts(&self, queue: &str) -> Result<JobCounts, QueueError> {
        debug!(%queue, "InMemoryDispatchQueue::counts: called");
        let queues = self.queues.lock().await;
        let mut counts = JobCounts::default();
        if let Some(jobs) = queues.get(queue) {
            for job in jobs {
                counts.add(job.state);
            }
        }
        Ok(counts)
    }
}
