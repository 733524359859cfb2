//! Dispatch job model and retry policy
//!
//! A job carries one action to one worker queue. The job id is the action
//! uuid, which is what makes enqueueing idempotent. State transitions live
//! here so every queue backend applies the same retry rules.

use serde::{Deserialize, Serialize};

use dispatchstore::{Record, now_ms};

use super::error::QueueError;

/// Default number of delivery attempts.
///
/// With the default backoff the waits run 1m, 3m, 7m, 15m and so on. The wait
/// after the tenth failure is already about 17 hours, and from the 49th
/// failure on the delay saturates at `u64::MAX` ms. Late attempts are
/// effectively parked until an operator promotes or retries them.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 60;

/// Default delay before the first retry
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 60_000;

/// Delay policy between failed attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Backoff {
    /// `(2^n - 1) * initial_delay_ms` after the n-th failure
    Exponential { initial_delay_ms: u64 },
}

impl Backoff {
    /// Delay before the next attempt once `attempts_made` attempts have failed.
    /// Saturates rather than overflowing.
    pub fn delay_ms(&self, attempts_made: u32) -> u64 {
        match self {
            Self::Exponential { initial_delay_ms } => {
                if attempts_made == 0 {
                    return 0;
                }
                let factor = 1u64
                    .checked_shl(attempts_made)
                    .map(|f| f - 1)
                    .unwrap_or(u64::MAX);
                initial_delay_ms.saturating_mul(factor)
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            initial_delay_ms: DEFAULT_INITIAL_BACKOFF_MS,
        }
    }
}

/// Delivery options attached to every job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    pub backoff: Backoff,
    pub max_attempts: u32,
    /// Drop the job once a consumer completes it
    pub remove_on_complete: bool,
    /// Drop the job once it exhausts its attempts
    pub remove_on_fail: bool,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            backoff: Backoff::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            remove_on_complete: true,
            remove_on_fail: false,
        }
    }
}

/// Where a job is in its delivery lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Ready to be taken by a consumer
    Waiting,
    /// Failed at least once, waiting out its backoff
    Delayed,
    /// Held by a consumer
    Active,
    /// Finished successfully (only kept when `remove_on_complete` is off)
    Completed,
    /// Exhausted its attempts; kept for operator inspection
    Failed,
}

impl JobState {
    /// States that count toward a queue's depth
    pub const LIVE: [JobState; 3] = [JobState::Waiting, JobState::Delayed, JobState::Active];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Delayed => "delayed",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Not yet finished
    pub fn is_live(&self) -> bool {
        Self::LIVE.contains(self)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "waiting" => Ok(Self::Waiting),
            "delayed" => Ok(Self::Delayed),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown job state: {}", s)),
        }
    }
}

/// Job payload handed to the execution consumer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPayload {
    pub action_uuid: String,
}

/// One action queued for one worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchJob {
    /// `{queue}/{job_id}`, unique across all queues
    pub key: String,

    /// Same as the action uuid
    pub job_id: String,

    /// Worker identifier owning the queue
    pub queue: String,

    pub payload: JobPayload,

    pub options: JobOptions,

    pub state: JobState,

    /// Failed attempts so far
    pub attempts_made: u32,

    /// Reason given with the most recent failure
    pub failed_reason: Option<String>,

    /// Enqueue timestamp (Unix milliseconds)
    pub enqueued_at: i64,

    /// Earliest time the job may be taken (Unix milliseconds)
    pub ready_at: i64,

    /// Completion or final failure timestamp (Unix milliseconds)
    pub finished_at: Option<i64>,

    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,
}

impl DispatchJob {
    /// Build the job for an action. The job id is the action uuid.
    pub fn for_action(action_uuid: impl Into<String>, options: JobOptions) -> Self {
        let action_uuid = action_uuid.into();
        let now = now_ms();
        Self {
            key: String::new(),
            job_id: action_uuid.clone(),
            queue: String::new(),
            payload: JobPayload { action_uuid },
            options,
            state: JobState::Waiting,
            attempts_made: 0,
            failed_reason: None,
            enqueued_at: now,
            ready_at: now,
            finished_at: None,
            updated_at: now,
        }
    }

    /// Record key for a job in a queue
    pub fn key_for(queue: &str, job_id: &str) -> String {
        format!("{}/{}", queue, job_id)
    }

    /// Bind the job to the queue it is being added to
    pub fn into_queue(mut self, queue: &str) -> Self {
        self.key = Self::key_for(queue, &self.job_id);
        self.queue = queue.to_string();
        self
    }

    /// Can a consumer take this job at `now`?
    pub fn is_due(&self, now: i64) -> bool {
        match self.state {
            JobState::Waiting => true,
            JobState::Delayed => self.ready_at <= now,
            _ => false,
        }
    }

    fn invalid(&self, to: JobState) -> QueueError {
        QueueError::InvalidTransition {
            job_id: self.job_id.clone(),
            from: self.state,
            to,
        }
    }

    /// Waiting or due-delayed -> Active
    pub fn start(&mut self, now: i64) -> Result<(), QueueError> {
        if !self.is_due(now) {
            return Err(self.invalid(JobState::Active));
        }
        self.state = JobState::Active;
        self.updated_at = now;
        Ok(())
    }

    /// Active -> Completed
    pub fn complete(&mut self, now: i64) -> Result<(), QueueError> {
        if self.state != JobState::Active {
            return Err(self.invalid(JobState::Completed));
        }
        self.state = JobState::Completed;
        self.finished_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Active -> Delayed (attempts left) or Failed (attempts exhausted).
    /// Returns the new state.
    pub fn fail(&mut self, reason: impl Into<String>, now: i64) -> Result<JobState, QueueError> {
        if self.state != JobState::Active {
            return Err(self.invalid(JobState::Failed));
        }
        self.attempts_made = self.attempts_made.saturating_add(1);
        self.failed_reason = Some(reason.into());
        self.updated_at = now;

        if self.attempts_made < self.options.max_attempts {
            let delay = self.options.backoff.delay_ms(self.attempts_made);
            self.ready_at = now.saturating_add(i64::try_from(delay).unwrap_or(i64::MAX));
            self.state = JobState::Delayed;
        } else {
            self.state = JobState::Failed;
            self.finished_at = Some(now);
        }
        Ok(self.state)
    }

    /// Delayed -> Waiting without waiting out the backoff
    pub fn promote(&mut self, now: i64) -> Result<(), QueueError> {
        if self.state != JobState::Delayed {
            return Err(self.invalid(JobState::Waiting));
        }
        self.state = JobState::Waiting;
        self.ready_at = now;
        self.updated_at = now;
        Ok(())
    }

    /// Failed -> Waiting with a fresh attempt budget
    pub fn retry(&mut self, now: i64) -> Result<(), QueueError> {
        if self.state != JobState::Failed {
            return Err(self.invalid(JobState::Waiting));
        }
        self.state = JobState::Waiting;
        self.attempts_made = 0;
        self.failed_reason = None;
        self.finished_at = None;
        self.ready_at = now;
        self.updated_at = now;
        Ok(())
    }
}

impl Record for DispatchJob {
    fn id(&self) -> &str {
        &self.key
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        "dispatch_jobs"
    }
}

/// Per-state job counts for one queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobCounts {
    pub waiting: usize,
    pub delayed: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

impl JobCounts {
    pub fn add(&mut self, state: JobState) {
        match state {
            JobState::Waiting => self.waiting += 1,
            JobState::Delayed => self.delayed += 1,
            JobState::Active => self.active += 1,
            JobState::Completed => self.completed += 1,
            JobState::Failed => self.failed += 1,
        }
    }

    /// Jobs not yet finished
    pub fn depth(&self) -> usize {
        self.waiting + self.delayed + self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active_job(max_attempts: u32) -> DispatchJob {
        let options = JobOptions {
            max_attempts,
            ..Default::default()
        };
        let mut job = DispatchJob::for_action("a-1", options).into_queue("w1");
        job.start(0).unwrap();
        job
    }

    #[test]
    fn test_default_options() {
        let options = JobOptions::default();
        assert_eq!(options.max_attempts, 60);
        assert_eq!(options.backoff, Backoff::Exponential { initial_delay_ms: 60_000 });
        assert!(options.remove_on_complete);
        assert!(!options.remove_on_fail);
    }

    #[test]
    fn test_backoff_growth() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay_ms(0), 0);
        assert_eq!(backoff.delay_ms(1), 60_000);
        assert_eq!(backoff.delay_ms(2), 180_000);
        assert_eq!(backoff.delay_ms(3), 420_000);
    }

    #[test]
    fn test_backoff_saturates() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay_ms(10), 1023 * 60_000);
        assert!(backoff.delay_ms(48) < u64::MAX);
        assert_eq!(backoff.delay_ms(49), u64::MAX);
        assert_eq!(backoff.delay_ms(59), u64::MAX);
        assert_eq!(backoff.delay_ms(64), u64::MAX);
        assert_eq!(backoff.delay_ms(200), u64::MAX);
    }

    #[test]
    fn test_job_id_is_action_uuid() {
        let job = DispatchJob::for_action("abc", JobOptions::default()).into_queue("w1");
        assert_eq!(job.job_id, "abc");
        assert_eq!(job.payload.action_uuid, "abc");
        assert_eq!(job.key, "w1/abc");
        assert_eq!(job.state, JobState::Waiting);
    }

    #[test]
    fn test_fail_schedules_retry() {
        let mut job = active_job(60);
        let state = job.fail("container crashed", 1_000).unwrap();
        assert_eq!(state, JobState::Delayed);
        assert_eq!(job.attempts_made, 1);
        assert_eq!(job.ready_at, 61_000);
        assert!(!job.is_due(60_999));
        assert!(job.is_due(61_000));
        assert_eq!(job.failed_reason.as_deref(), Some("container crashed"));
    }

    #[test]
    fn test_fail_exhausts_attempts() {
        let mut job = active_job(2);
        assert_eq!(job.fail("one", 0).unwrap(), JobState::Delayed);
        job.start(i64::MAX).unwrap();
        assert_eq!(job.fail("two", 5).unwrap(), JobState::Failed);
        assert_eq!(job.finished_at, Some(5));
        assert!(!job.state.is_live());
    }

    #[test]
    fn test_late_retries_do_not_overflow() {
        let mut job = active_job(100);
        job.attempts_made = 70;
        job.fail("again", 1_000).unwrap();
        assert_eq!(job.ready_at, i64::MAX);
    }

    #[test]
    fn test_invalid_transitions() {
        let mut job = DispatchJob::for_action("a", JobOptions::default()).into_queue("w1");
        assert!(job.complete(0).is_err());
        assert!(job.fail("x", 0).is_err());
        assert!(job.promote(0).is_err());
        assert!(job.retry(0).is_err());
    }

    #[test]
    fn test_retry_resets_budget() {
        let mut job = active_job(1);
        job.fail("boom", 0).unwrap();
        assert_eq!(job.state, JobState::Failed);

        job.retry(10).unwrap();
        assert_eq!(job.state, JobState::Waiting);
        assert_eq!(job.attempts_made, 0);
        assert!(job.failed_reason.is_none());
        assert!(job.finished_at.is_none());
    }

    #[test]
    fn test_counts_depth() {
        let mut counts = JobCounts::default();
        for state in [
            JobState::Waiting,
            JobState::Delayed,
            JobState::Active,
            JobState::Completed,
            JobState::Failed,
            JobState::Failed,
        ] {
            counts.add(state);
        }
        assert_eq!(counts.depth(), 3);
        assert_eq!(counts.failed, 2);
    }
}
