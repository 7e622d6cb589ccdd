//! Active/shadow deployment registry.
//!
//! Grounded on the original `register_deployment`/`get_active_deployment`/
//! `get_shadow_deployment`: at most one active row per `(workflow_id, role)`
//! at a time, enforced by deactivating the previous holder on registration.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentRole {
    Active,
    Shadow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub deployment_id: Uuid,
    pub workflow_id: String,
    pub snapshot_id: Uuid,
    pub role: DeploymentRole,
    pub sample_rate: f64,
    pub active: bool,
    pub deployed_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct DeploymentRegistry {
    // workflow_id -> all deployments ever registered, newest last
    deployments: DashMap<String, Vec<Deployment>>,
}

impl DeploymentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deactivate any existing deployment of the same role for this
    /// workflow, then insert the new one active.
    pub fn register(
        &self,
        workflow_id: &str,
        snapshot_id: Uuid,
        role: DeploymentRole,
        sample_rate: f64,
    ) -> Deployment {
        let mut entry = self.deployments.entry(workflow_id.to_string()).or_default();
        for existing in entry.iter_mut() {
            if existing.role == role {
                existing.active = false;
            }
        }

        let deployment = Deployment {
            deployment_id: Uuid::new_v4(),
            workflow_id: workflow_id.to_string(),
            snapshot_id,
            role,
            sample_rate,
            active: true,
            deployed_at: Utc::now(),
        };
        entry.push(deployment.clone());
        deployment
    }

    pub fn get_active(&self, workflow_id: &str, role: DeploymentRole) -> Option<Deployment> {
        self.deployments
            .get(workflow_id)?
            .iter()
            .find(|d| d.role == role && d.active)
            .cloned()
    }

    pub fn list(&self, workflow_id: &str, limit: usize) -> Vec<Deployment> {
        let mut items = self
            .deployments
            .get(workflow_id)
            .map(|v| v.clone())
            .unwrap_or_default();
        items.sort_by_key(|d| std::cmp::Reverse(d.deployed_at));
        items.truncate(limit);
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registering_active_deactivates_previous_active() {
        let registry = DeploymentRegistry::new();
        let first = registry.register("wf", Uuid::new_v4(), DeploymentRole::Active, 0.0);
        let second = registry.register("wf", Uuid::new_v4(), DeploymentRole::Active, 0.0);

        let active = registry.get_active("wf", DeploymentRole::Active).unwrap();
        assert_eq!(active.deployment_id, second.deployment_id);
        assert_ne!(active.deployment_id, first.deployment_id);
    }

    #[test]
    fn active_and_shadow_roles_are_independent() {
        let registry = DeploymentRegistry::new();
        registry.register("wf", Uuid::new_v4(), DeploymentRole::Active, 0.0);
        let shadow = registry.register("wf", Uuid::new_v4(), DeploymentRole::Shadow, 0.1);

        assert!(registry.get_active("wf", DeploymentRole::Active).is_some());
        assert_eq!(
            registry.get_active("wf", DeploymentRole::Shadow).unwrap().deployment_id,
            shadow.deployment_id
        );
    }
}
