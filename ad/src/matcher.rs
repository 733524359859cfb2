//! Capability matching
//!
//! Pure filtering of the worker catalogue against an action's hardware
//! requirements. No I/O, no side effects.

use tracing::debug;

use crate::domain::{ResourceRequirement, Worker};

/// Memory (GB) kept free on every worker for the host operating system
pub const OS_RESERVED_MEMORY_GB: u32 = 1;

/// True if `worker` may legally run an action with `requirements`
pub fn is_capable(worker: &Worker, requirements: &ResourceRequirement) -> bool {
    worker.reachable
        && worker.cpu_cores >= requirements.cpu_cores
        && u64::from(worker.cpu_memory_gb) >= u64::from(requirements.cpu_memory_gb) + u64::from(OS_RESERVED_MEMORY_GB)
        && worker.gpu_memory_gb >= requirements.gpu_memory_gb
}

/// Return the workers able to run an action with `requirements`.
///
/// An empty result is a normal outcome, not an error. Input order is kept.
pub fn match_workers(requirements: &ResourceRequirement, workers: &[Worker]) -> Vec<Worker> {
    debug!(%requirements, worker_count = workers.len(), "match_workers: called");
    let candidates: Vec<Worker> = workers
        .iter()
        .filter(|w| is_capable(w, requirements))
        .cloned()
        .collect();

    debug!(
        gpu_memory_gb = requirements.gpu_memory_gb,
        candidates = %candidates.iter().map(|w| w.identifier.as_str()).collect::<Vec<_>>().join(", "),
        "match_workers: available workers"
    );
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn worker(id: &str, cores: u32, mem: u32, gpu: u32) -> Worker {
        Worker::new(id, format!("{}.local", id), cores, mem, gpu)
    }

    #[test]
    fn test_exact_fit_needs_memory_headroom() {
        let req = ResourceRequirement::new(4, 16, 0);

        // 16GB worker cannot run a 16GB action: 1GB is reserved for the OS
        assert!(!is_capable(&worker("w1", 4, 16, 0), &req));
        assert!(is_capable(&worker("w2", 4, 17, 0), &req));
    }

    #[test]
    fn test_cores_and_gpu_compare_without_margin() {
        let req = ResourceRequirement::new(4, 8, 12);
        assert!(is_capable(&worker("w1", 4, 9, 12), &req));
        assert!(!is_capable(&worker("w2", 3, 64, 24), &req));
        assert!(!is_capable(&worker("w3", 16, 64, 11), &req));
    }

    #[test]
    fn test_unreachable_worker_excluded() {
        let req = ResourceRequirement::new(1, 1, 0);
        let w = worker("big", 128, 1024, 80).with_reachable(false);
        assert!(!is_capable(&w, &req));
        assert!(match_workers(&req, &[w]).is_empty());
    }

    #[test]
    fn test_no_candidates_is_empty_not_error() {
        let req = ResourceRequirement::new(64, 512, 80);
        let workers = vec![worker("w1", 4, 16, 0), worker("w2", 8, 32, 24)];
        assert!(match_workers(&req, &workers).is_empty());
    }

    #[test]
    fn test_match_keeps_input_order() {
        let req = ResourceRequirement::new(2, 8, 0);
        let workers = vec![
            worker("c", 4, 16, 0),
            worker("small", 1, 4, 0),
            worker("a", 4, 16, 0),
            worker("b", 4, 16, 0),
        ];
        let ids: Vec<_> = match_workers(&req, &workers)
            .into_iter()
            .map(|w| w.identifier)
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_max_requirement_does_not_overflow() {
        let req = ResourceRequirement::new(0, u32::MAX, 0);
        assert!(!is_capable(&worker("w1", 1, u32::MAX, 0), &req));
    }

    fn arb_requirement() -> impl Strategy<Value = ResourceRequirement> {
        (0u32..64, 0u32..256, 0u32..80).prop_map(|(c, m, g)| ResourceRequirement::new(c, m, g))
    }

    fn arb_worker() -> impl Strategy<Value = Worker> {
        (0u32..64, 0u32..256, 0u32..80, any::<bool>())
            .prop_map(|(c, m, g, r)| worker("w", c, m, g).with_reachable(r))
    }

    proptest! {
        #[test]
        fn prop_insufficient_memory_never_matches(req in arb_requirement(), w in arb_worker()) {
            prop_assume!(u64::from(w.cpu_memory_gb) < u64::from(req.cpu_memory_gb) + 1);
            prop_assert!(match_workers(&req, std::slice::from_ref(&w)).is_empty());
        }

        #[test]
        fn prop_unreachable_never_matches(req in arb_requirement(), w in arb_worker()) {
            let w = Worker { cpu_cores: u32::MAX, cpu_memory_gb: u32::MAX, gpu_memory_gb: u32::MAX, ..w }
                .with_reachable(false);
            prop_assert!(match_workers(&req, &[w]).is_empty());
        }

        #[test]
        fn prop_candidates_satisfy_every_requirement(
            req in arb_requirement(),
            workers in proptest::collection::vec(arb_worker(), 0..12),
        ) {
            for w in match_workers(&req, &workers) {
                prop_assert!(w.reachable);
                prop_assert!(w.cpu_cores >= req.cpu_cores);
                prop_assert!(w.cpu_memory_gb > req.cpu_memory_gb);
                prop_assert!(w.gpu_memory_gb >= req.gpu_memory_gb);
            }
        }
    }
}
