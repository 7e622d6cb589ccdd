//! Run identity and lifecycle: the `Run` record, its status machine, and an
//! in-process registry (`RunLifecycle`) used by the dispatcher to create runs
//! and enforce idempotent re-delivery.

use crate::{OrchestratorError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// `run.status` per the data model: `pending`, `running`, `awaiting_approval`,
/// `completed`, `failed`. Terminal on `completed`/`failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    AwaitingApproval,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::AwaitingApproval => "awaiting_approval",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Identity of one user request, `thread_id == run_id` for the graph executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub run_id: Uuid,
    pub workflow_id: String,
    pub status: RunStatus,
    pub input: Value,
    pub output: Option<Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Run {
    pub fn new(workflow_id: impl Into<String>, input: Value) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            workflow_id: workflow_id.into(),
            status: RunStatus::Pending,
            input,
            output: None,
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    pub fn thread_id(&self) -> String {
        self.run_id.to_string()
    }

    /// Synthesized `result` exposed by the run-lifecycle API: `output.final_output`.
    pub fn result(&self) -> Option<&Value> {
        self.output.as_ref()?.get("final_output")
    }

    fn transition(&mut self, to: RunStatus) -> Result<()> {
        if self.status.is_terminal() {
            return Err(OrchestratorError::InvalidRunState(format!(
                "run {} is terminal ({}), cannot transition to {to}",
                self.run_id, self.status
            )));
        }
        self.status = to;
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        self.transition(RunStatus::Running)?;
        self.started_at.get_or_insert(Utc::now());
        Ok(())
    }

    pub fn await_approval(&mut self) -> Result<()> {
        self.transition(RunStatus::AwaitingApproval)
    }

    pub fn complete(&mut self, output: Value) -> Result<()> {
        self.transition(RunStatus::Completed)?;
        self.output = Some(output);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<()> {
        self.transition(RunStatus::Failed)?;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
        Ok(())
    }
}

/// In-process registry of runs, owning the status machine's single-writer
/// discipline via an `RwLock` per table. A real deployment backs this with the
/// relational store named in the spec's persistence layout; this registry is
/// what the dispatcher and worker consult for idempotent re-delivery checks
/// (`is_completed`) without a database round trip.
#[derive(Debug, Default, Clone)]
pub struct RunLifecycle {
    runs: Arc<RwLock<HashMap<Uuid, Run>>>,
}

impl RunLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_run(&self, workflow_id: impl Into<String>, input: Value) -> Uuid {
        let run = Run::new(workflow_id, input);
        let id = run.run_id;
        self.runs.write().await.insert(id, run);
        id
    }

    pub async fn get(&self, run_id: Uuid) -> Option<Run> {
        self.runs.read().await.get(&run_id).cloned()
    }

    /// Idempotency check consulted by the worker before it re-executes a
    /// delivered task: a `completed` run is never re-run.
    pub async fn is_completed(&self, run_id: Uuid) -> bool {
        self.runs
            .read()
            .await
            .get(&run_id)
            .map(|r| r.status == RunStatus::Completed)
            .unwrap_or(false)
    }

    pub async fn mutate<F>(&self, run_id: Uuid, f: F) -> Result<()>
    where
        F: FnOnce(&mut Run) -> Result<()>,
    {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(&run_id)
            .ok_or_else(|| OrchestratorError::InvalidRunState(format!("run {run_id} not found")))?;
        f(run)
    }

    pub async fn list_by_status(&self, status: RunStatus) -> Vec<Run> {
        self.runs
            .read()
            .await
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn transitions_reject_after_terminal() {
        let mut run = Run::new("wf-1", json!({"input": "hi"}));
        run.start().unwrap();
        run.complete(json!({"final_output": "done"})).unwrap();
        assert!(run.fail("too late").is_err());
        assert_eq!(run.status, RunStatus::Completed);
    }

    #[test]
    fn result_reads_final_output_from_completed_output() {
        let mut run = Run::new("wf-1", json!({}));
        run.start().unwrap();
        run.complete(json!({"final_output": "42", "other": "x"})).unwrap();
        assert_eq!(run.result(), Some(&json!("42")));
    }

    #[tokio::test]
    async fn lifecycle_idempotency_check() {
        let lifecycle = RunLifecycle::new();
        let id = lifecycle.create_run("wf-1", json!({})).await;
        assert!(!lifecycle.is_completed(id).await);

        lifecycle
            .mutate(id, |r| r.start())
            .await
            .unwrap();
        lifecycle
            .mutate(id, |r| r.complete(json!({"final_output": "x"})))
            .await
            .unwrap();

        assert!(lifecycle.is_completed(id).await);
    }

    #[tokio::test]
    async fn list_by_status_filters() {
        let lifecycle = RunLifecycle::new();
        let a = lifecycle.create_run("wf-1", json!({})).await;
        let _b = lifecycle.create_run("wf-1", json!({})).await;
        lifecycle.mutate(a, |r| r.start()).await.unwrap();

        assert_eq!(lifecycle.list_by_status(RunStatus::Running).await.len(), 1);
        assert_eq!(lifecycle.list_by_status(RunStatus::Pending).await.len(), 1);
    }
}
