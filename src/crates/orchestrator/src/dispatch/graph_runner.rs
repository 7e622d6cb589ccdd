//! The seam between the dispatcher and `langgraph_core`'s compiled graphs.
//!
//! Agent construction and prompting are out of scope (spec §1: "the
//! language-model clients and the agents' internal prompting logic"), so the
//! dispatcher never builds a graph itself. [`GraphRunner`] is what a
//! deployment implements per workflow; [`CompiledGraphRunner`] is the
//! straightforward adapter over a registry of pre-compiled graphs, one per
//! `workflow_id`, each compiled once and reused across runs per §4.1.

use async_trait::async_trait;
use langgraph_core::error::GraphError;
use langgraph_core::{CheckpointConfig, CompiledGraph};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Translation of the executor's `Result<Value, GraphError>` into the three
/// cases the worker's run-status machine cares about. A `GraphError::Interrupted`
/// is not a failure — it is the pause the HITL coordinator expects at an
/// `interrupt_before` node (spec §4.1 step semantics, point 2).
#[derive(Debug, Clone)]
pub enum GraphOutcome {
    Completed(Value),
    Interrupted { node: String, reason: String },
    Failed(String),
}

fn classify(result: Result<Value, GraphError>) -> GraphOutcome {
    match result {
        Ok(value) => GraphOutcome::Completed(value),
        Err(GraphError::Interrupted { node, reason }) => GraphOutcome::Interrupted { node, reason },
        Err(other) => GraphOutcome::Failed(other.to_string()),
    }
}

#[async_trait]
pub trait GraphRunner: Send + Sync {
    /// Run `workflow_id`'s graph from scratch (or from its latest checkpoint,
    /// if `thread_id` already has one) with `input` as the initial state.
    async fn invoke(&self, workflow_id: &str, thread_id: &str, input: Value) -> GraphOutcome;

    /// Resume `thread_id` from its latest checkpoint with empty input —
    /// the executor's `resume(config)` contract (spec §4.1).
    async fn resume(&self, workflow_id: &str, thread_id: &str) -> GraphOutcome;

    /// Duplicate `src_checkpoint_id` (or the thread's latest checkpoint, if
    /// `None`) under a freshly minted thread id, returning that id. Used by
    /// `fork_run` (spec §6).
    async fn fork(
        &self,
        workflow_id: &str,
        src_thread_id: &str,
        src_checkpoint_id: Option<String>,
        new_thread_id: &str,
    ) -> Result<(), String>;
}

/// One compiled graph per workflow id. Graphs are supplied already compiled
/// (with their own checkpointer and `interrupt_before` set baked in) — the
/// registry only resolves `workflow_id -> graph` and drives invoke/resume.
#[derive(Clone, Default)]
pub struct CompiledGraphRunner {
    graphs: Arc<HashMap<String, Arc<CompiledGraph>>>,
}

impl CompiledGraphRunner {
    pub fn new(graphs: HashMap<String, Arc<CompiledGraph>>) -> Self {
        Self {
            graphs: Arc::new(graphs),
        }
    }

    fn graph(&self, workflow_id: &str) -> Option<Arc<CompiledGraph>> {
        self.graphs.get(workflow_id).cloned()
    }
}

#[async_trait]
impl GraphRunner for CompiledGraphRunner {
    async fn invoke(&self, workflow_id: &str, thread_id: &str, input: Value) -> GraphOutcome {
        let Some(graph) = self.graph(workflow_id) else {
            return GraphOutcome::Failed(format!(
                "no compiled graph registered for workflow {workflow_id}"
            ));
        };
        let config = CheckpointConfig::new().with_thread_id(thread_id.to_string());
        classify(graph.invoke_with_config(input, Some(config)).await)
    }

    async fn resume(&self, workflow_id: &str, thread_id: &str) -> GraphOutcome {
        let Some(graph) = self.graph(workflow_id) else {
            return GraphOutcome::Failed(format!(
                "no compiled graph registered for workflow {workflow_id}"
            ));
        };
        let config = CheckpointConfig::new().with_thread_id(thread_id.to_string());
        classify(graph.resume(config).await)
    }

    async fn fork(
        &self,
        workflow_id: &str,
        src_thread_id: &str,
        src_checkpoint_id: Option<String>,
        new_thread_id: &str,
    ) -> Result<(), String> {
        let graph = self
            .graph(workflow_id)
            .ok_or_else(|| format!("no compiled graph registered for workflow {workflow_id}"))?;

        let mut source = CheckpointConfig::new().with_thread_id(src_thread_id.to_string());
        if let Some(checkpoint_id) = src_checkpoint_id {
            source = source.with_checkpoint_id(checkpoint_id.into());
        }

        graph
            .fork(&source, new_thread_id.to_string())
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}
