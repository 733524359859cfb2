//! State management with actor pattern
//!
//! StateManager owns the DispatchStore and processes messages via channels,
//! providing thread-safe access to actions, workers and persisted jobs.

mod manager;
mod messages;

pub use manager::StateManager;
pub use messages::{StateCommand, StateError, StateResponse};
