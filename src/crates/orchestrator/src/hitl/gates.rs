//! Approval gate configuration: which graph steps require sign-off.
//!
//! Grounded on the original `ApprovalGate`/`DEFAULT_GATES`: a small static
//! table keyed by step name, resolved at the point a node would otherwise
//! run. Real deployments can extend this from [`OrchestratorConfig`]; for
//! now it mirrors the original's two seeded gates.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnReject {
    Abort,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnTimeout {
    Reject,
    Approve,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalGate {
    pub step: String,
    pub risk_level: RiskLevel,
    pub timeout_seconds: u64,
    pub on_reject: OnReject,
    pub on_timeout: OnTimeout,
    pub description: Option<String>,
}

impl ApprovalGate {
    pub fn new(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            risk_level: RiskLevel::Medium,
            timeout_seconds: 3600,
            on_reject: OnReject::Abort,
            on_timeout: OnTimeout::Reject,
            description: None,
        }
    }
}

/// Lookup table of statically configured gates, keyed by graph step name.
#[derive(Debug, Clone, Default)]
pub struct GateTable {
    gates: HashMap<String, ApprovalGate>,
}

impl GateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gate(mut self, gate: ApprovalGate) -> Self {
        self.gates.insert(gate.step.clone(), gate);
        self
    }

    /// The two gates the original deployment ships with: `executor` (high
    /// risk, tool execution) and `coder` (medium risk, code modification).
    pub fn seeded() -> Self {
        Self::new()
            .with_gate(ApprovalGate {
                description: Some("Review execution plan before running tools.".to_string()),
                risk_level: RiskLevel::High,
                ..ApprovalGate::new("executor")
            })
            .with_gate(ApprovalGate {
                description: Some("Review code modifications before finalizing.".to_string()),
                ..ApprovalGate::new("coder")
            })
    }

    pub fn get(&self, step_name: &str) -> Option<&ApprovalGate> {
        self.gates.get(step_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_table_has_executor_and_coder_gates() {
        let table = GateTable::seeded();
        assert_eq!(table.get("executor").unwrap().risk_level, RiskLevel::High);
        assert_eq!(table.get("coder").unwrap().risk_level, RiskLevel::Medium);
        assert!(table.get("finalizer").is_none());
    }
}
