//! Least-loaded selection among capable workers
//!
//! Candidates are ordered by hostname descending, their queue depths are
//! fetched concurrently, and a stable sort by depth picks the winner. Equal
//! depths therefore resolve to the greatest hostname.

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, warn};

use crate::domain::Worker;
use crate::queue::{DispatchQueue, QueueError};

/// Pick the worker with the fewest unfinished jobs.
///
/// Returns `Ok(None)` only for an empty candidate list. Any depth lookup
/// failure aborts the whole selection.
pub async fn select_worker(
    candidates: Vec<Worker>,
    queue: &dyn DispatchQueue,
    concurrency: usize,
) -> Result<Option<Worker>, QueueError> {
    debug!(candidates = candidates.len(), concurrency, "select_worker: called");
    if candidates.is_empty() {
        return Ok(None);
    }

    let ordered = order_by_hostname(candidates);
    let depths = queue_depths(&ordered, queue, concurrency).await?;

    Ok(least_loaded(ordered, &depths))
}

/// Depth of each worker's queue, in input order, with at most `concurrency`
/// lookups in flight
pub async fn queue_depths(
    workers: &[Worker],
    queue: &dyn DispatchQueue,
    concurrency: usize,
) -> Result<Vec<usize>, QueueError> {
    debug!(workers = workers.len(), concurrency, "queue_depths: called");
    stream::iter(workers)
        .map(|w| queue.depth(&w.identifier))
        .buffered(concurrency.max(1))
        .try_collect()
        .await
}

/// Sort by hostname, greatest first
pub fn order_by_hostname(mut workers: Vec<Worker>) -> Vec<Worker> {
    workers.sort_by(|a, b| b.hostname.cmp(&a.hostname));
    workers
}

/// First worker of `ordered` with the minimum depth.
///
/// `depths[i]` is the depth of `ordered[i]`. Returns `None` when the two
/// lengths differ.
pub fn least_loaded(ordered: Vec<Worker>, depths: &[usize]) -> Option<Worker> {
    if ordered.len() != depths.len() {
        warn!(
            workers = ordered.len(),
            depths = depths.len(),
            "least_loaded: depth count does not match worker count"
        );
        return None;
    }

    let mut paired: Vec<(usize, Worker)> = depths.iter().copied().zip(ordered).collect();
    paired.sort_by_key(|(depth, _)| *depth);

    let (depth, chosen) = paired.into_iter().next()?;
    debug!(worker = %chosen.identifier, hostname = %chosen.hostname, depth, "least_loaded: selected");
    Some(chosen)
}
