//! Job dispatch and run lifecycle (spec §6): submission, broker hand-off
//! with a local-execution fallback, and routing human decisions back into
//! paused runs.

pub mod graph_runner;
pub mod queue;
pub mod worker;

pub use graph_runner::{CompiledGraphRunner, GraphOutcome, GraphRunner};
pub use queue::{in_process, Broker, DispatchTask, InProcessBroker};
pub use worker::{spawn_worker_loop, Worker, WorkerConfig};

use crate::hitl::{submit_decision, Decision, GateTable, OnTimeout, ReviewQueue, ReviewStatus};
use crate::run::RunLifecycle;
use crate::{OrchestratorError, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Default interval between expired-review sweeps, matching the HITL
/// coordinator's own sweep cadence.
pub const DEFAULT_EXPIRY_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Entry point for submitting workflow runs and routing HITL decisions back
/// into execution. Wraps a [`Broker`] for inbound submission and a [`Worker`]
/// for execution, falling back to direct in-process execution when the
/// broker can't accept a task (spec §6).
#[derive(Clone)]
pub struct Dispatcher {
    lifecycle: RunLifecycle,
    broker: Arc<dyn Broker>,
    worker: Worker,
    reviews: ReviewQueue,
    gates: Arc<GateTable>,
}

impl Dispatcher {
    pub fn new(
        lifecycle: RunLifecycle,
        broker: Arc<dyn Broker>,
        worker: Worker,
        reviews: ReviewQueue,
        gates: Arc<GateTable>,
    ) -> Self {
        Self {
            lifecycle,
            broker,
            worker,
            reviews,
            gates,
        }
    }

    pub fn lifecycle(&self) -> &RunLifecycle {
        &self.lifecycle
    }

    /// Create a run and hand its task to the broker. If the broker can't
    /// accept it, fall back to running it on this process directly rather
    /// than losing the submission.
    pub async fn submit(&self, workflow_id: impl Into<String>, input: Value) -> Result<Uuid> {
        let workflow_id = workflow_id.into();
        let run_id = self
            .lifecycle
            .create_run(workflow_id.clone(), input.clone())
            .await;
        let task = DispatchTask::new(run_id, workflow_id, input);

        if self.broker.enqueue(task.clone()).await.is_err() {
            tracing::warn!(run_id = %run_id, "broker unreachable, falling back to local execution");
            self.spawn_local_fallback(task);
        }
        Ok(run_id)
    }

    fn spawn_local_fallback(&self, task: DispatchTask) {
        let worker = self.worker.clone();
        let run_id = task.task_id;
        tokio::spawn(async move {
            if let Err(err) = worker.run_task(task).await {
                tracing::error!(run_id = %run_id, error = %err, "local fallback execution failed");
            }
        });
    }

    /// Apply a human decision to a pending review, then resume or abort the
    /// underlying run accordingly (spec §4.5).
    pub async fn handle_decision(
        &self,
        review_id: Uuid,
        decision: Decision,
        actor: impl Into<String>,
        reason: Option<String>,
    ) -> Result<()> {
        let updated = submit_decision(&self.reviews, review_id, decision, actor, reason.clone()).await?;

        match updated.status {
            ReviewStatus::Approved => {
                self.worker
                    .resume_after_approval(&updated.workflow_id, updated.run_id)
                    .await
            }
            ReviewStatus::Rejected => {
                self.worker
                    .abort_after_rejection(
                        updated.run_id,
                        &updated.step_name,
                        reason.as_deref().unwrap_or("rejected by reviewer"),
                    )
                    .await
            }
            other => Err(OrchestratorError::InvalidRunState(format!(
                "unexpected review status right after a decision was recorded: {other:?}"
            ))),
        }
    }

    /// Sweep expired reviews and carry out each one's `on_timeout` policy.
    /// [`crate::hitl::sweeper`] only flags expiry and logs it — acting on
    /// the policy needs a [`Worker`], which lives here instead.
    pub async fn sweep_expired_reviews(&self) {
        for request in self.reviews.mark_expired().await {
            let on_timeout = self
                .gates
                .get(&request.step_name)
                .map(|g| g.on_timeout)
                .unwrap_or(OnTimeout::Reject);

            let result = match on_timeout {
                OnTimeout::Approve => {
                    self.worker
                        .resume_after_approval(&request.workflow_id, request.run_id)
                        .await
                }
                OnTimeout::Reject => {
                    self.worker
                        .abort_after_rejection(request.run_id, &request.step_name, "review expired")
                        .await
                }
            };

            if let Err(err) = result {
                tracing::error!(run_id = %request.run_id, error = %err, "failed to apply on_timeout policy");
            }
        }
    }

    pub fn spawn_expiry_sweeper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                dispatcher.sweep_expired_reviews().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::hitl::{ApprovalGate, OnReject, ReviewRequest};
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Mutex as TokioMutex;

    struct ScriptedRunner {
        outcome: TokioMutex<Option<GraphOutcome>>,
    }

    #[async_trait]
    impl GraphRunner for ScriptedRunner {
        async fn invoke(&self, _workflow_id: &str, _thread_id: &str, _input: Value) -> GraphOutcome {
            self.outcome
                .lock()
                .await
                .take()
                .unwrap_or(GraphOutcome::Failed("no scripted outcome".to_string()))
        }

        async fn resume(&self, _workflow_id: &str, _thread_id: &str) -> GraphOutcome {
            self.outcome
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

    struct UnreachableBroker;

    #[async_trait]
    impl Broker for UnreachableBroker {
        async fn enqueue(&self, _task: DispatchTask) -> std::result::Result<(), String> {
            Err("connection refused".to_string())
        }
        async fn dequeue(&self) -> Option<DispatchTask> {
            None
        }
    }

    fn dispatcher_with(
        broker: Arc<dyn Broker>,
        outcome: GraphOutcome,
        gates: GateTable,
    ) -> (Dispatcher, RunLifecycle) {
        let lifecycle = RunLifecycle::new();
        let runner = Arc::new(ScriptedRunner {
            outcome: TokioMutex::new(Some(outcome)),
        });
        let reviews = ReviewQueue::new();
        let gates = Arc::new(gates);
        let worker = Worker::new(
            runner,
            lifecycle.clone(),
            gates.clone(),
            reviews.clone(),
            EventBus::new(),
        )
        .with_config(WorkerConfig {
            start_delay: Duration::from_millis(0),
            deadline: Duration::from_secs(5),
        });
        let dispatcher = Dispatcher::new(lifecycle.clone(), broker, worker, reviews, gates);
        (dispatcher, lifecycle)
    }

    #[tokio::test]
    async fn submit_enqueues_task_onto_broker() {
        let broker = queue::in_process();
        let (dispatcher, _lifecycle) = dispatcher_with(
            broker.clone(),
            GraphOutcome::Completed(json!({})),
            GateTable::seeded(),
        );

        let run_id = dispatcher.submit("wf-1", json!({"x": 1})).await.unwrap();
        let task = broker.dequeue().await.unwrap();
        assert_eq!(task.task_id, run_id);
        assert_eq!(task.workflow_id, "wf-1");
    }

    #[tokio::test]
    async fn submit_falls_back_to_local_execution_when_broker_unreachable() {
        let (dispatcher, lifecycle) = dispatcher_with(
            Arc::new(UnreachableBroker),
            GraphOutcome::Completed(json!({"ok": true})),
            GateTable::seeded(),
        );

        let run_id = dispatcher.submit("wf-1", json!({})).await.unwrap();

        for _ in 0..50 {
            if lifecycle.is_completed(run_id).await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(lifecycle.is_completed(run_id).await);
    }

    #[tokio::test]
    async fn handle_decision_approve_resumes_run() {
        let (dispatcher, lifecycle) = dispatcher_with(
            queue::in_process(),
            GraphOutcome::Completed(json!({"resumed": true})),
            GateTable::seeded(),
        );

        let run_id = lifecycle.create_run("wf-1", json!({})).await;
        lifecycle.mutate(run_id, |r| r.start()).await.unwrap();
        lifecycle.mutate(run_id, |r| r.await_approval()).await.unwrap();

        let request = ReviewRequest::new(
            "wf-1",
            run_id,
            run_id.to_string(),
            &ApprovalGate::new("executor"),
            None,
            None,
            0.0,
        );
        let review_id = dispatcher.reviews.create(request).await;

        dispatcher
            .handle_decision(review_id, Decision::Approve, "alice", None)
            .await
            .unwrap();

        assert_eq!(
            lifecycle.get(run_id).await.unwrap().status,
            crate::run::RunStatus::Completed
        );
    }

    #[tokio::test]
    async fn handle_decision_reject_aborts_run() {
        let (dispatcher, lifecycle) = dispatcher_with(
            queue::in_process(),
            GraphOutcome::Completed(json!({})),
            GateTable::seeded(),
        );

        let run_id = lifecycle.create_run("wf-1", json!({})).await;
        lifecycle.mutate(run_id, |r| r.start()).await.unwrap();
        lifecycle.mutate(run_id, |r| r.await_approval()).await.unwrap();

        let request = ReviewRequest::new(
            "wf-1",
            run_id,
            run_id.to_string(),
            &ApprovalGate::new("executor"),
            None,
            None,
            0.0,
        );
        let review_id = dispatcher.reviews.create(request).await;

        dispatcher
            .handle_decision(review_id, Decision::Reject, "bob", Some("too risky".to_string()))
            .await
            .unwrap();

        let run = lifecycle.get(run_id).await.unwrap();
        assert_eq!(run.status, crate::run::RunStatus::Failed);
        assert!(run.error.unwrap().contains("too risky"));
    }

    #[tokio::test]
    async fn sweep_expired_reviews_applies_on_timeout_reject() {
        let gates = GateTable::new().with_gate(ApprovalGate {
            timeout_seconds: 0,
            on_reject: OnReject::Abort,
            ..ApprovalGate::new("executor")
        });
        let (dispatcher, lifecycle) = dispatcher_with(queue::in_process(), GraphOutcome::Completed(json!({})), gates);

        let run_id = lifecycle.create_run("wf-1", json!({})).await;
        lifecycle.mutate(run_id, |r| r.start()).await.unwrap();
        lifecycle.mutate(run_id, |r| r.await_approval()).await.unwrap();

        let gate = ApprovalGate {
            timeout_seconds: 0,
            ..ApprovalGate::new("executor")
        };
        let request = ReviewRequest::new("wf-1", run_id, run_id.to_string(), &gate, None, None, 0.0);
        dispatcher.reviews.create(request).await;

        tokio::time::sleep(Duration::from_millis(5)).await;
        dispatcher.sweep_expired_reviews().await;

        assert_eq!(
            lifecycle.get(run_id).await.unwrap().status,
            crate::run::RunStatus::Failed
        );
    }
}
