//! Workflow lifecycle event bus.
//!
//! Grounded on the original `ThreadSafeEventBus`/`WorkflowEventEmitter` pair:
//! a per-run FIFO queue polled by `pop_events`, with the in-memory bus always
//! receiving a copy regardless of whatever external pub/sub transport is
//! wired in (known double-delivery risk across processes, see DESIGN.md).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    WorkflowStarted,
    WorkflowAgentStarted,
    WorkflowAgentCompleted,
    WorkflowProgress,
    WorkflowCompleted,
    WorkflowFailed,
    WorkflowCostUpdate,
    /// Advisory event carrying a preview of shadow-deployment output;
    /// delivered only to `driver`/`approver` fan-out roles (spec §4.4).
    ShadowHint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub timestamp_utc: DateTime<Utc>,
    pub run_id: Uuid,
    pub event_type: EventType,
    pub agent_name: Option<String>,
    pub progress: Option<f64>,
    pub cost_so_far: Option<f64>,
    pub payload: serde_json::Value,
}

impl WorkflowEvent {
    pub fn new(run_id: Uuid, event_type: EventType) -> Self {
        Self {
            timestamp_utc: Utc::now(),
            run_id,
            event_type,
            agent_name: None,
            progress: None,
            cost_so_far: None,
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_agent(mut self, agent_name: impl Into<String>) -> Self {
        self.agent_name = Some(agent_name.into());
        self
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_cost(mut self, cost_so_far: f64) -> Self {
        self.cost_so_far = Some(cost_so_far);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Per-run FIFO queue, safe to publish into from any task.
#[derive(Debug, Default, Clone)]
pub struct EventBus {
    queues: Arc<Mutex<HashMap<Uuid, Vec<WorkflowEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn publish(&self, event: WorkflowEvent) {
        let mut queues = self.queues.lock().await;
        queues.entry(event.run_id).or_default().push(event);
    }

    /// Drain and return all events queued for `run_id`.
    pub async fn pop_events(&self, run_id: Uuid) -> Vec<WorkflowEvent> {
        let mut queues = self.queues.lock().await;
        queues.remove(&run_id).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_then_pop_drains_queue() {
        let bus = EventBus::new();
        let run_id = Uuid::new_v4();

        bus.publish(WorkflowEvent::new(run_id, EventType::WorkflowStarted)).await;
        bus.publish(
            WorkflowEvent::new(run_id, EventType::WorkflowProgress).with_progress(0.5),
        )
        .await;

        let events = bus.pop_events(run_id).await;
        assert_eq!(events.len(), 2);
        assert!(bus.pop_events(run_id).await.is_empty());
    }

    #[tokio::test]
    async fn separate_runs_have_separate_queues() {
        let bus = EventBus::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        bus.publish(WorkflowEvent::new(a, EventType::WorkflowStarted)).await;

        assert_eq!(bus.pop_events(a).await.len(), 1);
        assert!(bus.pop_events(b).await.is_empty());
    }
}
