//! Asynchronous task queue: the dispatcher's inbound submission path.
//!
//! Grounded on [`crate::run::RunLifecycle`]'s `(task_id = run_id, payload)`
//! shape from spec §6 and the original dispatcher's Celery-backed queue with
//! a local-fallback path when no broker is reachable. `Broker` is the seam a
//! real deployment backs with an external queue; [`InProcessBroker`] is the
//! always-available fallback, an unbounded mpsc channel guarded by a mutex on
//! the receiving end so multiple worker loops could in principle share it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

/// `{task_id = run_id, payload: {workflow_config, input_data}}` from spec §6,
/// flattened to the two fields a worker actually needs to start execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchTask {
    pub task_id: Uuid,
    pub workflow_id: String,
    pub input: Value,
}

impl DispatchTask {
    pub fn new(task_id: Uuid, workflow_id: impl Into<String>, input: Value) -> Self {
        Self {
            task_id,
            workflow_id: workflow_id.into(),
            input,
        }
    }
}

/// An asynchronous task queue backend. `enqueue` returning `Err` signals the
/// broker is unreachable; the dispatcher treats that as grounds to fall back
/// to local execution rather than losing the submission.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn enqueue(&self, task: DispatchTask) -> Result<(), String>;

    /// Block until a task is available, or return `None` once the queue is
    /// closed (no more senders).
    async fn dequeue(&self) -> Option<DispatchTask>;
}

/// In-process fallback broker: an unbounded channel standing in for a real
/// message broker in single-process deployments and tests. Always
/// available — `enqueue` only fails once every receiver has been dropped.
pub struct InProcessBroker {
    sender: mpsc::UnboundedSender<DispatchTask>,
    receiver: Mutex<mpsc::UnboundedReceiver<DispatchTask>>,
}

impl InProcessBroker {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
        }
    }
}

impl Default for InProcessBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for InProcessBroker {
    async fn enqueue(&self, task: DispatchTask) -> Result<(), String> {
        self.sender
            .send(task)
            .map_err(|e| format!("in-process broker closed: {e}"))
    }

    async fn dequeue(&self) -> Option<DispatchTask> {
        self.receiver.lock().await.recv().await
    }
}

/// Shared handle convenience so callers don't repeat `Arc<dyn Broker>`.
pub fn in_process() -> Arc<dyn Broker> {
    Arc::new(InProcessBroker::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn enqueue_then_dequeue_round_trips() {
        let broker = InProcessBroker::new();
        let task = DispatchTask::new(Uuid::new_v4(), "wf-1", json!({"input": "hi"}));
        broker.enqueue(task.clone()).await.unwrap();

        let received = broker.dequeue().await.unwrap();
        assert_eq!(received.task_id, task.task_id);
        assert_eq!(received.workflow_id, "wf-1");
    }

    #[tokio::test]
    async fn dequeue_returns_none_once_all_senders_dropped() {
        let (sender, receiver) = mpsc::unbounded_channel::<DispatchTask>();
        let broker = InProcessBroker {
            sender,
            receiver: Mutex::new(receiver),
        };
        drop(broker.sender.clone());
        // the struct's own sender must also be dropped for the channel to close
        let InProcessBroker { sender, receiver } = broker;
        drop(sender);
        assert!(receiver.lock().await.recv().await.is_none());
    }
}
