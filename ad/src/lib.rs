//! ActionDispatch - capability-aware action scheduler
//!
//! Matches actions to workers by declared hardware, balances them across
//! per-worker dispatch queues and delivers each action at most once per queue
//! with bounded exponential retries.

pub mod balancer;
pub mod cli;
pub mod config;
pub mod domain;
pub mod matcher;
pub mod queue;
pub mod scheduler;
pub mod state;

pub use domain::{Action, ActionState, ResourceRequirement, Worker};
pub use queue::{DispatchJob, DispatchQueue, InMemoryDispatchQueue, JobLifecycle, JobState, StoreDispatchQueue};
pub use scheduler::{ActionScheduler, ScheduleOutcome, SchedulerConfig, SchedulerError};
pub use state::StateManager;
