//! Deployment and shadow-run versioning (spec §4.6): snapshotting a workflow
//! version, promoting it to active or shadow, sampled shadow execution
//! against the active baseline, divergence monitoring, and rollback.

pub mod audit;
pub mod registry;
pub mod snapshot;

pub use audit::{entry, AuditAction, AuditEntry, AuditSink, InMemoryAuditLog};
pub use registry::{Deployment, DeploymentRegistry, DeploymentRole};
pub use snapshot::{Snapshot, SnapshotMetadata, SnapshotStore};

use crate::config::ShadowConfig;
use crate::dispatch::{GraphOutcome, GraphRunner};
use crate::{OrchestratorError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Minimum number of shadow samples collected for a workflow before its
/// rolling average similarity is allowed to trigger an alert — guards
/// against a handful of early samples reading as a false alarm.
const MIN_SAMPLES_BEFORE_ALERT: usize = 5;

/// Outcome of comparing one shadow run's output against the active
/// deployment's output for the same input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub workflow_id: String,
    pub run_id: Uuid,
    pub similarity: f64,
    pub diverged: bool,
}

#[derive(Debug, Default)]
struct DivergenceHistory {
    similarities: Vec<f64>,
}

/// Coordinates the versioning lifecycle: snapshot creation, active/shadow
/// promotion, sampled shadow execution, divergence tracking, and rollback.
pub struct VersioningCoordinator<A: AuditSink> {
    pub snapshots: SnapshotStore,
    pub deployments: Arc<DeploymentRegistry>,
    pub audit: Arc<A>,
    runner: Arc<dyn GraphRunner>,
    history: Arc<RwLock<HashMap<String, DivergenceHistory>>>,
    window: usize,
    divergence_threshold: f64,
    alert_rate: f64,
}

impl<A: AuditSink> Clone for VersioningCoordinator<A> {
    fn clone(&self) -> Self {
        Self {
            snapshots: self.snapshots.clone(),
            deployments: self.deployments.clone(),
            audit: self.audit.clone(),
            runner: self.runner.clone(),
            history: self.history.clone(),
            window: self.window,
            divergence_threshold: self.divergence_threshold,
            alert_rate: self.alert_rate,
        }
    }
}

impl<A: AuditSink> VersioningCoordinator<A> {
    pub fn new(
        snapshots: SnapshotStore,
        deployments: Arc<DeploymentRegistry>,
        audit: Arc<A>,
        runner: Arc<dyn GraphRunner>,
        config: &ShadowConfig,
    ) -> Self {
        Self {
            snapshots,
            deployments,
            audit,
            runner,
            history: Arc::new(RwLock::new(HashMap::new())),
            window: config.window,
            divergence_threshold: config.divergence_threshold,
            alert_rate: config.alert_rate,
        }
    }

    /// Snapshot `artifacts` and promote them to `role`, optionally gated on
    /// an external evaluation result (`eval_passed`). A `Some(false)` rejects
    /// the deployment and records `DeployRejected` without ever writing a
    /// snapshot's active pointer.
    pub async fn deploy(
        &self,
        workflow_id: &str,
        version_tag: &str,
        artifacts: &BTreeMap<String, Vec<u8>>,
        role: DeploymentRole,
        sample_rate: f64,
        eval_passed: Option<bool>,
    ) -> Result<Deployment> {
        if eval_passed == Some(false) {
            self.audit
                .record(audit::entry(
                    workflow_id,
                    AuditAction::DeployRejected,
                    format!("version {version_tag} failed its evaluation gate"),
                    "system",
                ))
                .await;
            return Err(OrchestratorError::Validation(format!(
                "deployment of {workflow_id}:{version_tag} rejected: evaluation gate failed"
            )));
        }

        let snapshot = self
            .snapshots
            .create_snapshot(workflow_id, version_tag, artifacts, None)
            .map_err(|e| OrchestratorError::Internal(e.to_string()))?;

        self.audit
            .record(audit::entry(
                workflow_id,
                AuditAction::Snapshot,
                format!("created snapshot {} for {version_tag}", snapshot.snapshot_id),
                "system",
            ))
            .await;

        let deployment = self
            .deployments
            .register(workflow_id, snapshot.snapshot_id, role, sample_rate);

        let mut deploy_entry = audit::entry(
            workflow_id,
            AuditAction::Deploy,
            format!("deployed {version_tag} as {role:?} (sample_rate={sample_rate})"),
            "system",
        );
        deploy_entry.snapshot_id = Some(snapshot.snapshot_id.to_string());
        deploy_entry.deployment_id = Some(deployment.deployment_id.to_string());
        self.audit.record(deploy_entry).await;

        Ok(deployment)
    }

    /// If a shadow deployment is active for `workflow_id` and this sample is
    /// selected, run it against `input` under a derived thread id and compare
    /// its output to the baseline's. Returns `None` when there's no active
    /// shadow or the sample was skipped.
    pub async fn maybe_run_shadow(
        &self,
        workflow_id: &str,
        run_id: Uuid,
        input: Value,
        baseline_output: &Value,
    ) -> Option<ComparisonResult> {
        let shadow = self.deployments.get_active(workflow_id, DeploymentRole::Shadow)?;
        if rand::random::<f64>() >= shadow.sample_rate {
            return None;
        }

        let shadow_thread = format!("shadow-{run_id}");
        let outcome = self.runner.invoke(workflow_id, &shadow_thread, input).await;
        let shadow_output = match outcome {
            GraphOutcome::Completed(value) => value,
            GraphOutcome::Interrupted { node, reason } => {
                tracing::warn!(workflow_id, %run_id, node, reason, "shadow run interrupted, treating output as divergent");
                Value::Null
            }
            GraphOutcome::Failed(message) => {
                tracing::warn!(workflow_id, %run_id, error = %message, "shadow run failed, treating output as divergent");
                Value::Null
            }
        };

        let similarity = compare(baseline_output, &shadow_output);
        let diverged = similarity < self.divergence_threshold;
        self.record_sample(workflow_id, similarity).await;

        Some(ComparisonResult {
            workflow_id: workflow_id.to_string(),
            run_id,
            similarity,
            diverged,
        })
    }

    /// Trigger is the *fraction* of the rolling window scoring below
    /// `divergence_threshold`, not the window's mean similarity — a window
    /// that is 20% at 0.5 and 80% at 1.0 averages 0.9 (no alert under a
    /// mean-based rule) but is exactly the S6 scenario this is grounded on:
    /// 20% of samples below threshold, over a configured alert rate.
    async fn record_sample(&self, workflow_id: &str, similarity: f64) {
        let (fraction_below, samples) = {
            let mut history = self.history.write().await;
            let entry = history.entry(workflow_id.to_string()).or_default();
            entry.similarities.push(similarity);
            if entry.similarities.len() > self.window {
                let excess = entry.similarities.len() - self.window;
                entry.similarities.drain(0..excess);
            }
            let samples = entry.similarities.len();
            let below = entry
                .similarities
                .iter()
                .filter(|&&s| s < self.divergence_threshold)
                .count();
            (below as f64 / samples as f64, samples)
        };

        if samples < MIN_SAMPLES_BEFORE_ALERT || fraction_below <= self.alert_rate {
            return;
        }

        self.audit
            .record(audit::entry(
                workflow_id,
                AuditAction::Alert,
                format!(
                    "shadow divergence alert: {:.1}% of the last {samples} samples scored below similarity threshold {:.3} (configured rate {:.1}%)",
                    fraction_below * 100.0,
                    self.divergence_threshold,
                    self.alert_rate * 100.0
                ),
                "system",
            ))
            .await;
    }

    /// Promote `target_snapshot_id` back to the active deployment.
    pub async fn rollback(
        &self,
        workflow_id: &str,
        target_snapshot_id: Uuid,
        reason: &str,
    ) -> Result<Deployment> {
        let deployment = self
            .deployments
            .register(workflow_id, target_snapshot_id, DeploymentRole::Active, 0.0);

        let mut entry = audit::entry(
            workflow_id,
            AuditAction::Rollback,
            format!("rolled back to snapshot {target_snapshot_id}: {reason}"),
            "system",
        );
        entry.snapshot_id = Some(target_snapshot_id.to_string());
        entry.deployment_id = Some(deployment.deployment_id.to_string());
        self.audit.record(entry).await;

        Ok(deployment)
    }
}

/// Structural similarity in `[0, 1]`. Exact match scores 1.0; for objects,
/// the fraction of the union of keys whose values agree; anything else
/// that isn't an exact match scores 0.0. No NLP-grade semantic comparison
/// is attempted — good enough to flag gross behavioral drift, not to judge
/// prose quality.
fn compare(a: &Value, b: &Value) -> f64 {
    if a == b {
        return 1.0;
    }
    match (a, b) {
        (Value::Object(a), Value::Object(b)) => {
            let keys: std::collections::BTreeSet<&String> = a.keys().chain(b.keys()).collect();
            if keys.is_empty() {
                return 1.0;
            }
            let matches = keys
                .iter()
                .filter(|k| a.get(k.as_str()) == b.get(k.as_str()))
                .count();
            matches as f64 / keys.len() as f64
        }
        _ => 0.0,
    }
}
