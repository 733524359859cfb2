//! Scheduler configuration

use serde::{Deserialize, Serialize};

use crate::queue::{Backoff, DEFAULT_INITIAL_BACKOFF_MS, DEFAULT_MAX_ATTEMPTS, JobOptions};

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Delivery attempts per job before it is parked as failed
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// First retry delay; later delays grow exponentially
    #[serde(rename = "initial-backoff-ms")]
    pub initial_backoff_ms: u64,

    /// Drop jobs once a consumer completes them
    #[serde(rename = "remove-on-complete")]
    pub remove_on_complete: bool,

    /// Max concurrent queue-depth lookups while balancing
    #[serde(rename = "depth-concurrency")]
    pub depth_concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            remove_on_complete: true,
            depth_concurrency: 16,
        }
    }
}

impl SchedulerConfig {
    /// Options attached to every job this scheduler enqueues.
    ///
    /// Failed jobs always stay in their queue for inspection and `retry`.
    pub fn job_options(&self) -> JobOptions {
        JobOptions {
            backoff: Backoff::Exponential {
                initial_delay_ms: self.initial_backoff_ms,
            },
            max_attempts: self.max_attempts,
            remove_on_complete: self.remove_on_complete,
            remove_on_fail: false,
        }
    }
}
