//! Periodic expiry sweep.
//!
//! Grounded on the original `ReviewQueueService.mark_expired`, turned into a
//! background interval task: each tick moves overdue pending reviews to
//! `Expired` and reports them so the caller can apply each gate's
//! `on_timeout` policy (resume with an implicit approve, or fail the run).

use super::gates::{GateTable, OnTimeout};
use super::queue::ReviewQueue;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Run the sweep loop until the returned handle is dropped or aborted.
pub fn spawn_sweeper(
    queue: ReviewQueue,
    gates: Arc<GateTable>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let expired = queue.mark_expired().await;
            for request in expired {
                let gate = gates.get(&request.step_name);
                let on_timeout = gate.map(|g| g.on_timeout).unwrap_or(OnTimeout::Reject);
                tracing::info!(
                    review_id = %request.review_id,
                    step = %request.step_name,
                    ?on_timeout,
                    "review request expired"
                );
            }
        }
    })
}
