//! Worker domain type
//!
//! A registered compute node. Workers are created and refreshed by the
//! registration/heartbeat process; the scheduler only reads them.

use serde::{Deserialize, Serialize};

use dispatchstore::{Record, now_ms};

/// A compute node that can run actions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    /// Stable id, also used as the worker's queue name
    pub identifier: String,

    pub hostname: String,

    pub cpu_cores: u32,

    pub cpu_memory_gb: u32,

    pub gpu_memory_gb: u32,

    /// Set by the heartbeat process; unreachable workers never receive work
    pub reachable: bool,

    /// Last heartbeat (Unix milliseconds)
    pub last_seen: i64,

    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,
}

impl Worker {
    /// Create a reachable worker seen just now
    pub fn new(
        identifier: impl Into<String>,
        hostname: impl Into<String>,
        cpu_cores: u32,
        cpu_memory_gb: u32,
        gpu_memory_gb: u32,
    ) -> Self {
        let now = now_ms();
        Self {
            identifier: identifier.into(),
            hostname: hostname.into(),
            cpu_cores,
            cpu_memory_gb,
            gpu_memory_gb,
            reachable: true,
            last_seen: now,
            updated_at: now,
        }
    }

    /// Builder method to set reachability
    pub fn with_reachable(mut self, reachable: bool) -> Self {
        self.reachable = reachable;
        self
    }
}

impl Record for Worker {
    fn id(&self) -> &str {
        &self.identifier
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        "workers"
    }
}
