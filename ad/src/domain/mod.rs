//! Domain types for ActionDispatch
//!
//! Action, Worker and ResourceRequirement. Actions and workers implement
//! the Record trait for DispatchStore persistence.

mod action;
mod requirement;
mod worker;

pub use action::{Action, ActionState, NO_CAPABLE_WORKER_CAUSE};
pub use requirement::ResourceRequirement;
pub use worker::Worker;

// Re-export dispatchstore types for convenience
pub use dispatchstore::{Filter, FilterOp, IndexValue, Record, Store, now_ms};
