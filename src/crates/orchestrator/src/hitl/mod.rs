//! Human-in-the-loop review coordinator: gates, queue, decisions, sweeper.

pub mod decisions;
pub mod gates;
pub mod queue;
pub mod sweeper;

pub use decisions::{submit_decision, Decision};
pub use gates::{ApprovalGate, GateTable, OnReject, OnTimeout, RiskLevel};
pub use queue::{ReviewQueue, ReviewRequest, ReviewStatus};
pub use sweeper::{spawn_sweeper, DEFAULT_SWEEP_INTERVAL};

use std::sync::Arc;

/// Bundles the pieces a running orchestrator needs to offer HITL gates:
/// the static gate table, the shared queue, and a handle to the background
/// sweeper once started.
#[derive(Clone)]
pub struct HitlCoordinator {
    pub gates: Arc<GateTable>,
    pub queue: ReviewQueue,
}

impl HitlCoordinator {
    pub fn new(gates: GateTable) -> Self {
        Self {
            gates: Arc::new(gates),
            queue: ReviewQueue::new(),
        }
    }

    pub fn start_sweeper(&self, interval: std::time::Duration) -> tokio::task::JoinHandle<()> {
        spawn_sweeper(self.queue.clone(), self.gates.clone(), interval)
    }
}

impl Default for HitlCoordinator {
    fn default() -> Self {
        Self::new(GateTable::seeded())
    }
}
