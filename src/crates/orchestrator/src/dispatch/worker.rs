//! The worker: drives one dispatched task through the graph runner, applying
//! HITL gates and recording run-status transitions and lifecycle events.
//!
//! Grounded on [`crate::run::RunLifecycle`]'s status machine and the original
//! dispatcher's "2 second start delay, 300 second deadline" fallback-execution
//! rule (spec §6): every task gets a deadline timeout around the graph
//! invocation, and an interrupt surfaces as `awaiting_approval` rather than
//! a failure.

use crate::dispatch::graph_runner::{GraphOutcome, GraphRunner};
use crate::dispatch::queue::{Broker, DispatchTask};
use crate::events::{EventBus, EventType, WorkflowEvent};
use crate::hitl::{ApprovalGate, GateTable, OnReject, ReviewQueue, ReviewRequest};
use crate::run::RunLifecycle;
use crate::{OrchestratorError, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Local-fallback start delay before a dequeued task begins executing,
    /// giving an external broker a chance to claim it first.
    pub start_delay: Duration,
    /// Overall wall-clock deadline for a single graph invocation.
    pub deadline: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            start_delay: Duration::from_secs(2),
            deadline: Duration::from_secs(300),
        }
    }
}

#[derive(Clone)]
pub struct Worker {
    runner: Arc<dyn GraphRunner>,
    lifecycle: RunLifecycle,
    gates: Arc<GateTable>,
    reviews: ReviewQueue,
    events: EventBus,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        runner: Arc<dyn GraphRunner>,
        lifecycle: RunLifecycle,
        gates: Arc<GateTable>,
        reviews: ReviewQueue,
        events: EventBus,
    ) -> Self {
        Self {
            runner,
            lifecycle,
            gates,
            reviews,
            events,
            config: WorkerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn reviews(&self) -> &ReviewQueue {
        &self.reviews
    }

    /// Run one dispatched task to completion, interruption, or failure.
    /// A run already `completed` is skipped outright (spec §6 idempotency).
    pub async fn run_task(&self, task: DispatchTask) -> Result<()> {
        if self.lifecycle.is_completed(task.task_id).await {
            tracing::info!(run_id = %task.task_id, "skipping already-completed run");
            return Ok(());
        }

        self.lifecycle.mutate(task.task_id, |r| r.start()).await?;
        self.events
            .publish(WorkflowEvent::new(task.task_id, EventType::WorkflowStarted))
            .await;

        let thread_id = task.task_id.to_string();
        let invocation = self
            .runner
            .invoke(&task.workflow_id, &thread_id, task.input.clone());

        match tokio::time::timeout(self.config.deadline, invocation).await {
            Ok(outcome) => self.apply_outcome(&task, outcome).await,
            Err(_) => {
                let deadline_secs = self.config.deadline.as_secs();
                self.lifecycle
                    .mutate(task.task_id, |r| {
                        r.fail(format!("exceeded deadline of {deadline_secs}s"))
                    })
                    .await?;
                self.events
                    .publish(WorkflowEvent::new(task.task_id, EventType::WorkflowFailed))
                    .await;
                Err(OrchestratorError::WorkflowTimeout {
                    run_id: task.task_id.to_string(),
                    deadline_secs,
                })
            }
        }
    }

    async fn apply_outcome(&self, task: &DispatchTask, outcome: GraphOutcome) -> Result<()> {
        match outcome {
            GraphOutcome::Completed(value) => {
                self.lifecycle
                    .mutate(task.task_id, |r| {
                        r.complete(serde_json::json!({ "final_output": value }))
                    })
                    .await?;
                self.events
                    .publish(WorkflowEvent::new(task.task_id, EventType::WorkflowCompleted))
                    .await;
                Ok(())
            }
            GraphOutcome::Interrupted { node, reason } => self.pause_for_review(task, &node, &reason).await,
            GraphOutcome::Failed(message) => {
                self.lifecycle
                    .mutate(task.task_id, |r| r.fail(message.clone()))
                    .await?;
                self.events
                    .publish(
                        WorkflowEvent::new(task.task_id, EventType::WorkflowFailed)
                            .with_payload(serde_json::json!({ "error": message })),
                    )
                    .await;
                Ok(())
            }
        }
    }

    /// Park the run at `awaiting_approval` and open a review request against
    /// the gate configured for `node` (falling back to a default-risk gate
    /// if the step isn't in the static table).
    async fn pause_for_review(&self, task: &DispatchTask, node: &str, reason: &str) -> Result<()> {
        let gate = self
            .gates
            .get(node)
            .cloned()
            .unwrap_or_else(|| ApprovalGate::new(node));

        self.lifecycle.mutate(task.task_id, |r| r.await_approval()).await?;

        let request = ReviewRequest::new(
            task.workflow_id.clone(),
            task.task_id,
            task.task_id.to_string(),
            &gate,
            None,
            Some(serde_json::json!({ "reason": reason })),
            0.0,
        );
        self.reviews.create(request).await;

        self.events
            .publish(
                WorkflowEvent::new(task.task_id, EventType::WorkflowProgress)
                    .with_agent(node.to_string())
                    .with_payload(serde_json::json!({ "awaiting_approval": true, "reason": reason })),
            )
            .await;
        Ok(())
    }

    /// Resume a run whose review was approved: re-enter the graph at its
    /// last checkpoint via [`GraphRunner::resume`].
    pub async fn resume_after_approval(&self, workflow_id: &str, run_id: Uuid) -> Result<()> {
        self.lifecycle.mutate(run_id, |r| r.start()).await?;
        let thread_id = run_id.to_string();
        let outcome = self.runner.resume(workflow_id, &thread_id).await;
        let task = DispatchTask::new(run_id, workflow_id.to_string(), Value::Null);
        self.apply_outcome(&task, outcome).await
    }

    /// Apply a review rejection's `on_reject` policy (spec §4.5 step 4).
    /// `Fallback` has no corresponding mechanism in the graph executor —
    /// there is no fallback-node concept to route to — so it degrades to
    /// `Abort` with a message that names the gap rather than pretending to
    /// honor it.
    pub async fn abort_after_rejection(&self, run_id: Uuid, node: &str, reason: &str) -> Result<()> {
        let on_reject = self.gates.get(node).map(|g| g.on_reject);
        let message = match on_reject {
            Some(OnReject::Fallback) => {
                format!("rejected at {node} (no fallback node configured, aborting): {reason}")
            }
            _ => format!("rejected at {node}: {reason}"),
        };

        self.lifecycle.mutate(run_id, |r| r.fail(message.clone())).await?;
        self.events
            .publish(
                WorkflowEvent::new(run_id, EventType::WorkflowFailed)
                    .with_payload(serde_json::json!({ "error": message })),
            )
            .await;
        Ok(())
    }
}

/// Drive a worker off a broker queue: dequeue, wait out the start delay, run.
/// Exits once the broker's queue is permanently closed.
pub fn spawn_worker_loop(worker: Worker, broker: Arc<dyn Broker>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(task) = broker.dequeue().await {
            tokio::time::sleep(worker.config.start_delay).await;
            if let Err(err) = worker.run_task(task.clone()).await {
                tracing::error!(run_id = %task.task_id, error = %err, "run failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hitl::Decision;
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Mutex as TokioMutex;

    struct ScriptedRunner {
        invoke_outcome: TokioMutex<Option<GraphOutcome>>,
        resume_outcome: TokioMutex<Option<GraphOutcome>>,
    }

    #[async_trait]
    impl GraphRunner for ScriptedRunner {
        async fn invoke(&self, _workflow_id: &str, _thread_id: &str, _input: Value) -> GraphOutcome {
            self.invoke_outcome
                .lock()
                .await
                .take()
                .unwrap_or(GraphOutcome::Failed("no scripted outcome".to_string()))
        }

        async fn resume(&self, _workflow_id: &str, _thread_id: &str) -> GraphOutcome {
            self.resume_outcome
                .lock()
                .await
                .take()
                .unwrap_or(GraphOutcome::Failed("no scripted outcome".to_string()))
        }

        async fn fork(
            &self,
            _workflow_id: &str,
            _src_thread_id: &str,
            _src_checkpoint_id: Option<String>,
            _new_thread_id: &str,
        ) -> std::result::Result<(), String> {
            Ok(())
        }
    }

    fn fast_config() -> WorkerConfig {
        WorkerConfig {
            start_delay: Duration::from_millis(0),
            deadline: Duration::from_secs(5),
        }
    }

    async fn worker_with(outcome: GraphOutcome) -> (Worker, RunLifecycle) {
        let lifecycle = RunLifecycle::new();
        let runner = Arc::new(ScriptedRunner {
            invoke_outcome: TokioMutex::new(Some(outcome)),
            resume_outcome: TokioMutex::new(None),
        });
        let worker = Worker::new(
            runner,
            lifecycle.clone(),
            Arc::new(GateTable::seeded()),
            ReviewQueue::new(),
            EventBus::new(),
        )
        .with_config(fast_config());
        (worker, lifecycle)
    }

    #[tokio::test]
    async fn completed_outcome_marks_run_completed_and_publishes_event() {
        let (worker, lifecycle) = worker_with(GraphOutcome::Completed(json!({"ok": true}))).await;
        let run_id = lifecycle.create_run("wf-1", json!({})).await;
        let task = DispatchTask::new(run_id, "wf-1", json!({}));

        worker.run_task(task).await.unwrap();

        let run = lifecycle.get(run_id).await.unwrap();
        assert_eq!(run.status, crate::run::RunStatus::Completed);
        assert_eq!(run.result(), Some(&json!({"ok": true})));

        let events = worker.events().pop_events(run_id).await;
        assert!(events
            .iter()
            .any(|e| e.event_type == EventType::WorkflowCompleted));
    }

    #[tokio::test]
    async fn already_completed_run_is_skipped() {
        let (worker, lifecycle) = worker_with(GraphOutcome::Failed("should not run".to_string())).await;
        let run_id = lifecycle.create_run("wf-1", json!({})).await;
        lifecycle.mutate(run_id, |r| r.start()).await.unwrap();
        lifecycle
            .mutate(run_id, |r| r.complete(json!({"final_output": "x"})))
            .await
            .unwrap();

        worker
            .run_task(DispatchTask::new(run_id, "wf-1", json!({})))
            .await
            .unwrap();

        assert_eq!(
            lifecycle.get(run_id).await.unwrap().status,
            crate::run::RunStatus::Completed
        );
    }

    #[tokio::test]
    async fn interrupted_outcome_parks_run_and_opens_review() {
        let (worker, lifecycle) = worker_with(GraphOutcome::Interrupted {
            node: "executor".to_string(),
            reason: "budget exceeded".to_string(),
        })
        .await;
        let run_id = lifecycle.create_run("wf-1", json!({})).await;

        worker
            .run_task(DispatchTask::new(run_id, "wf-1", json!({})))
            .await
            .unwrap();

        assert_eq!(
            lifecycle.get(run_id).await.unwrap().status,
            crate::run::RunStatus::AwaitingApproval
        );
        let pending = worker.reviews().list_pending(Some("wf-1")).await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].step_name, "executor");
    }

    #[tokio::test]
    async fn resume_after_approval_completes_run() {
        let lifecycle = RunLifecycle::new();
        let run_id = lifecycle.create_run("wf-1", json!({})).await;
        lifecycle.mutate(run_id, |r| r.start()).await.unwrap();
        lifecycle.mutate(run_id, |r| r.await_approval()).await.unwrap();

        let runner = Arc::new(ScriptedRunner {
            invoke_outcome: TokioMutex::new(None),
            resume_outcome: TokioMutex::new(Some(GraphOutcome::Completed(json!({"resumed": true})))),
        });
        let worker = Worker::new(
            runner,
            lifecycle.clone(),
            Arc::new(GateTable::seeded()),
            ReviewQueue::new(),
            EventBus::new(),
        )
        .with_config(fast_config());

        worker.resume_after_approval("wf-1", run_id).await.unwrap();
        assert_eq!(
            lifecycle.get(run_id).await.unwrap().status,
            crate::run::RunStatus::Completed
        );
    }

    #[tokio::test]
    async fn abort_after_rejection_fails_run_with_reason() {
        let lifecycle = RunLifecycle::new();
        let run_id = lifecycle.create_run("wf-1", json!({})).await;
        lifecycle.mutate(run_id, |r| r.start()).await.unwrap();
        lifecycle.mutate(run_id, |r| r.await_approval()).await.unwrap();

        let runner = Arc::new(ScriptedRunner {
            invoke_outcome: TokioMutex::new(None),
            resume_outcome: TokioMutex::new(None),
        });
        let worker = Worker::new(
            runner,
            lifecycle.clone(),
            Arc::new(GateTable::seeded()),
            ReviewQueue::new(),
            EventBus::new(),
        )
        .with_config(fast_config());

        worker
            .abort_after_rejection(run_id, "executor", "too risky")
            .await
            .unwrap();

        let run = lifecycle.get(run_id).await.unwrap();
        assert_eq!(run.status, crate::run::RunStatus::Failed);
        assert!(run.error.unwrap().contains("too risky"));
        // Decision enum is part of the public hitl surface this module reacts to.
        let _ = Decision::Reject;
    }
}
