//! End-to-end exercises of the dispatcher/graph-executor/HITL stack wired
//! together the way a real deployment would assemble them, covering the
//! simple-query short-circuit, the HITL approval round trip, and fork
//! independence.

use langgraph_checkpoint::InMemoryCheckpointSaver;
use langgraph_core::{InterruptConfig, StateGraph};
use orchestrator::dispatch::{CompiledGraphRunner, Dispatcher, GraphRunner, InProcessBroker, Worker};
use orchestrator::events::EventBus;
use orchestrator::hitl::{submit_decision, ApprovalGate, Decision, GateTable, OnReject, OnTimeout, ReviewQueue, ReviewStatus};
use orchestrator::run::{RunLifecycle, RunStatus};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

/// Builds the `researcher -> finalizer | planner -> executor -> finalizer`
/// shape from spec §4.1's two named conditional selectors, collapsed to the
/// two slots the routing actually depends on (`query_complexity`, `mode`).
fn build_workflow_graph(interrupt_before: &[&str]) -> langgraph_core::CompiledGraph {
    let mut graph = StateGraph::new();

    graph.add_node("researcher", |mut state| {
        Box::pin(async move {
            if let Some(obj) = state.as_object_mut() {
                let input = obj.get("input").and_then(|v| v.as_str()).unwrap_or("");
                let complexity = if input.split_whitespace().count() <= 10
                    && !input.to_lowercase().contains("architecture")
                {
                    "SIMPLE"
                } else {
                    "COMPLEX"
                };
                obj.insert("query_complexity".to_string(), json!(complexity));
                obj.insert("research_data".to_string(), json!(format!("notes on: {input}")));
            }
            Ok(state)
        })
    });

    graph.add_node("planner", |mut state| {
        Box::pin(async move {
            if let Some(obj) = state.as_object_mut() {
                obj.insert("plan_data".to_string(), json!("execute the plan"));
            }
            Ok(state)
        })
    });

    graph.add_node("executor", |mut state| {
        Box::pin(async move {
            if let Some(obj) = state.as_object_mut() {
                obj.insert("execution_data".to_string(), json!("ran the tools"));
            }
            Ok(state)
        })
    });

    graph.add_node("finalizer", |mut state| {
        Box::pin(async move {
            if let Some(obj) = state.as_object_mut() {
                let summary = obj
                    .get("execution_data")
                    .or_else(|| obj.get("research_data"))
                    .cloned()
                    .unwrap_or(json!("nothing to report"));
                obj.insert("final_output".to_string(), summary);
            }
            Ok(state)
        })
    });

    graph.add_edge("__start__", "researcher");

    let mut after_researcher = HashMap::new();
    after_researcher.insert("finalizer".to_string(), "finalizer".to_string());
    after_researcher.insert("planner".to_string(), "planner".to_string());
    graph.add_conditional_edge(
        "researcher",
        |state| {
            use langgraph_core::send::ConditionalEdgeResult;
            let simple = state.get("query_complexity").and_then(|v| v.as_str()) == Some("SIMPLE");
            let research_only = state.get("mode").and_then(|v| v.as_str()) == Some("research_only");
            if simple || research_only {
                ConditionalEdgeResult::Node("finalizer".to_string())
            } else {
                ConditionalEdgeResult::Node("planner".to_string())
            }
        },
        after_researcher,
    );

    let mut after_planner = HashMap::new();
    after_planner.insert("finalizer".to_string(), "finalizer".to_string());
    after_planner.insert("executor".to_string(), "executor".to_string());
    graph.add_conditional_edge(
        "planner",
        |state| {
            use langgraph_core::send::ConditionalEdgeResult;
            if state.get("mode").and_then(|v| v.as_str()) == Some("plan_only") {
                ConditionalEdgeResult::Node("finalizer".to_string())
            } else {
                ConditionalEdgeResult::Node("executor".to_string())
            }
        },
        after_planner,
    );

    graph.add_edge("executor", "finalizer");
    graph.add_finish("finalizer");

    let interrupt_config = InterruptConfig {
        interrupt_before: interrupt_before.iter().map(|s| s.to_string()).collect(),
        interrupt_after: vec![],
        interrupt_before_all: false,
        interrupt_after_all: false,
    };

    graph
        .compile()
        .expect("workflow graph compiles")
        .with_checkpointer(Arc::new(InMemoryCheckpointSaver::new()))
        .with_interrupt_config(interrupt_config)
}

fn dispatcher_for(
    runner: Arc<dyn GraphRunner>,
    gates: GateTable,
) -> (Dispatcher, RunLifecycle, ReviewQueue, EventBus) {
    let lifecycle = RunLifecycle::new();
    let reviews = ReviewQueue::new();
    let events = EventBus::new();
    let gates = Arc::new(gates);
    let worker = Worker::new(runner, lifecycle.clone(), gates.clone(), reviews.clone(), events.clone());
    let broker: Arc<dyn orchestrator::dispatch::Broker> = Arc::new(InProcessBroker::new());
    let dispatcher = Dispatcher::new(lifecycle.clone(), broker, worker, reviews.clone(), gates);
    (dispatcher, lifecycle, reviews, events)
}

async fn wait_for_terminal(lifecycle: &RunLifecycle, run_id: uuid::Uuid) -> RunStatus {
    for _ in 0..200 {
        if let Some(run) = lifecycle.get(run_id).await {
            if run.status.is_terminal() || run.status == RunStatus::AwaitingApproval {
                return run.status;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("run never reached a terminal or awaiting_approval state");
}

/// S1: a short query with no gate declared on `researcher`/`finalizer`
/// takes the `researcher -> finalizer` shortcut, skipping `planner`/`executor`
/// entirely, and completes with a non-empty `final_output` (spec §8 invariant 1).
#[tokio::test]
async fn simple_query_short_circuits_to_finalizer() {
    let mut graphs = HashMap::new();
    graphs.insert("qa".to_string(), Arc::new(build_workflow_graph(&[])));
    let runner: Arc<dyn GraphRunner> = Arc::new(CompiledGraphRunner::new(graphs));
    let (dispatcher, lifecycle, _reviews, _events) = dispatcher_for(runner, GateTable::new());

    let run_id = dispatcher
        .submit("qa", json!({"input": "What is Python?", "mode": "full"}))
        .await
        .unwrap();

    let status = wait_for_terminal(&lifecycle, run_id).await;
    assert_eq!(status, RunStatus::Completed);

    let run = lifecycle.get(run_id).await.unwrap();
    let result = run.result().expect("completed run has a synthesized result");
    assert!(!result.as_str().unwrap_or_default().is_empty());
    assert!(result.as_str().unwrap().contains("notes on"));
}

/// S2: a gate on `executor` pauses the run before it runs, opens a pending
/// review, and an `approve` decision resumes the run to completion without
/// re-running `researcher`/`planner` (spec §8 invariant 3: resume observed
/// exactly once).
#[tokio::test]
async fn hitl_gate_pauses_then_resumes_on_approval() {
    let mut graphs = HashMap::new();
    graphs.insert(
        "complex-task".to_string(),
        Arc::new(build_workflow_graph(&["executor"])),
    );
    let runner: Arc<dyn GraphRunner> = Arc::new(CompiledGraphRunner::new(graphs));
    let gates = GateTable::new().with_gate(ApprovalGate {
        on_reject: OnReject::Abort,
        on_timeout: OnTimeout::Reject,
        ..ApprovalGate::new("executor")
    });
    let (dispatcher, lifecycle, reviews, _events) = dispatcher_for(runner, gates);

    let run_id = dispatcher
        .submit(
            "complex-task",
            json!({"input": "design a distributed systems architecture", "mode": "full"}),
        )
        .await
        .unwrap();

    let status = wait_for_terminal(&lifecycle, run_id).await;
    assert_eq!(status, RunStatus::AwaitingApproval);

    let pending = reviews.list_pending(None).await;
    assert_eq!(pending.len(), 1);
    let review = &pending[0];
    assert_eq!(review.run_id, run_id);
    assert_eq!(review.step_name, "executor");
    assert_eq!(review.status, ReviewStatus::Pending);

    dispatcher
        .handle_decision(review.review_id, Decision::Approve, "reviewer-1", None)
        .await
        .unwrap();

    let status = wait_for_terminal(&lifecycle, run_id).await;
    assert_eq!(status, RunStatus::Completed);
    let run = lifecycle.get(run_id).await.unwrap();
    let result = run.result().expect("completed run has a synthesized result");
    assert_eq!(result, &json!("ran the tools"));

    // A second decision on the same review is rejected outright.
    let second = submit_decision(&reviews, review.review_id, Decision::Reject, "reviewer-2", None).await;
    assert!(second.is_err());
}

/// S2 variant: rejection with `on_reject = abort` marks the run `failed`
/// rather than resuming it.
#[tokio::test]
async fn hitl_gate_rejection_aborts_the_run() {
    let mut graphs = HashMap::new();
    graphs.insert(
        "complex-task".to_string(),
        Arc::new(build_workflow_graph(&["executor"])),
    );
    let runner: Arc<dyn GraphRunner> = Arc::new(CompiledGraphRunner::new(graphs));
    let gates = GateTable::new().with_gate(ApprovalGate::new("executor"));
    let (dispatcher, lifecycle, reviews, _events) = dispatcher_for(runner, gates);

    let run_id = dispatcher
        .submit(
            "complex-task",
            json!({"input": "design a distributed systems architecture", "mode": "full"}),
        )
        .await
        .unwrap();
    wait_for_terminal(&lifecycle, run_id).await;

    let review = reviews.list_pending(None).await.into_iter().next().unwrap();
    dispatcher
        .handle_decision(review.review_id, Decision::Reject, "reviewer-1", Some("too risky".into()))
        .await
        .unwrap();

    let run = lifecycle.get(run_id).await.unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.error.unwrap().contains("too risky"));
}

/// S5: forking a paused run's checkpoint produces an independent thread —
/// resuming the fork drives it to completion without touching the source
/// run, which stays parked awaiting its own decision.
#[tokio::test]
async fn fork_from_checkpoint_is_independent_of_source_run() {
    let graph = Arc::new(build_workflow_graph(&["executor"]));
    let mut graphs = HashMap::new();
    graphs.insert("complex-task".to_string(), graph.clone());
    let runner = CompiledGraphRunner::new(graphs);

    let src_thread = uuid::Uuid::new_v4().to_string();
    let outcome = runner
        .invoke(
            "complex-task",
            &src_thread,
            json!({"input": "design a distributed systems architecture", "mode": "full"}),
        )
        .await;
    assert!(matches!(outcome, orchestrator::dispatch::GraphOutcome::Interrupted { .. }));

    let src_config = langgraph_core::CheckpointConfig::new().with_thread_id(src_thread.clone());
    let src_snapshot_before = graph
        .get_state(&src_config)
        .await
        .unwrap()
        .expect("source thread has a checkpoint");

    let fork_thread = uuid::Uuid::new_v4().to_string();
    runner
        .fork("complex-task", &src_thread, None, &fork_thread)
        .await
        .expect("fork succeeds from a paused checkpoint");
    assert_ne!(src_thread, fork_thread);

    let fork_outcome = runner.resume("complex-task", &fork_thread).await;
    match fork_outcome {
        orchestrator::dispatch::GraphOutcome::Completed(value) => {
            assert_eq!(value.get("final_output"), Some(&json!("ran the tools")));
        }
        other => panic!("expected the fork to complete, got {other:?}"),
    }

    // Resuming and completing the fork never touched the source thread's own
    // checkpoint lineage: it's still parked at the same interrupted node.
    let src_snapshot_after = graph
        .get_state(&src_config)
        .await
        .unwrap()
        .expect("source thread checkpoint still present");
    assert_eq!(
        src_snapshot_before.config.checkpoint_id,
        src_snapshot_after.config.checkpoint_id
    );
}
