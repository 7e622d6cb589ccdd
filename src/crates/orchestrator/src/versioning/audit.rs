//! Immutable audit log for versioning actions.
//!
//! Grounded on the original `record_audit_log`: one append-only entry per
//! action, never mutated or deleted afterward. The sink here is in-memory;
//! `AuditSink` is a trait so a real deployment can forward entries to
//! durable storage without touching call sites.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Snapshot,
    Deploy,
    DeployRejected,
    Rollback,
    Alert,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub workflow_id: String,
    pub action: AuditAction,
    pub details: String,
    pub actor: String,
    pub snapshot_id: Option<String>,
    pub deployment_id: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry);
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryAuditLog {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries_for(&self, workflow_id: &str) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .await
            .iter()
            .filter(|e| e.workflow_id == workflow_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditLog {
    async fn record(&self, entry: AuditEntry) {
        tracing::info!(
            workflow_id = %entry.workflow_id,
            action = ?entry.action,
            "AUDIT: {}",
            entry.details
        );
        self.entries.lock().await.push(entry);
    }
}

pub fn entry(
    workflow_id: impl Into<String>,
    action: AuditAction,
    details: impl Into<String>,
    actor: impl Into<String>,
) -> AuditEntry {
    AuditEntry {
        workflow_id: workflow_id.into(),
        action,
        details: details.into(),
        actor: actor.into(),
        snapshot_id: None,
        deployment_id: None,
        recorded_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_are_scoped_by_workflow() {
        let log = InMemoryAuditLog::new();
        log.record(entry("wf-a", AuditAction::Deploy, "deployed v1", "system"))
            .await;
        log.record(entry("wf-b", AuditAction::Deploy, "deployed v1", "system"))
            .await;

        assert_eq!(log.entries_for("wf-a").await.len(), 1);
        assert_eq!(log.entries_for("wf-c").await.len(), 0);
    }
}
