//! Action scheduling
//!
//! Capability match, least-loaded selection, a single-row ownership update,
//! then enqueue on the chosen worker's queue.

mod config;
mod core;
mod error;
mod outcome;
mod ports;

pub use config::SchedulerConfig;
pub use core::ActionScheduler;
pub use error::SchedulerError;
pub use outcome::ScheduleOutcome;
pub use ports::{ActionStore, DirectoryError, WorkerDirectory};
