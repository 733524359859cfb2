//! Hardware requirements of an action

use serde::{Deserialize, Serialize};

/// Resources an action needs from the worker that runs it.
///
/// Copied from the action template onto each action at submission time.
/// A `gpu_memory_gb` of 0 means no GPU is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ResourceRequirement {
    pub cpu_cores: u32,
    pub cpu_memory_gb: u32,
    pub gpu_memory_gb: u32,
}

impl ResourceRequirement {
    pub fn new(cpu_cores: u32, cpu_memory_gb: u32, gpu_memory_gb: u32) -> Self {
        Self {
            cpu_cores,
            cpu_memory_gb,
            gpu_memory_gb,
        }
    }

    /// True if the action needs a GPU at all
    pub fn needs_gpu(&self) -> bool {
        self.gpu_memory_gb > 0
    }
}

impl std::fmt::Display for ResourceRequirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} cores, {}GB RAM, {}GB GPU",
            self.cpu_cores, self.cpu_memory_gb, self.gpu_memory_gb
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_gpu() {
        assert!(!ResourceRequirement::new(2, 8, 0).needs_gpu());
        assert!(ResourceRequirement::new(2, 8, 12).needs_gpu());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            ResourceRequirement::new(4, 16, 0).to_string(),
            "4 cores, 16GB RAM, 0GB GPU"
        );
    }
}
