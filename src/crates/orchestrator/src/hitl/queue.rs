//! Review request queue.
//!
//! Grounded on the original `ReviewRequest` model and `ReviewQueueService`:
//! an in-memory table keyed by review id, `list_pending` scoped optionally
//! by workflow, and `mark_expired` sweeping anything past `expires_at`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::gates::{ApprovalGate, RiskLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub review_id: Uuid,
    pub workflow_id: String,
    pub run_id: Uuid,
    pub thread_id: String,
    pub checkpoint_id: Option<String>,
    pub step_name: String,
    pub status: ReviewStatus,
    pub proposed_action: Option<Value>,
    pub cost_estimate_usd: f64,
    pub risk_level: RiskLevel,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub decision_at: Option<DateTime<Utc>>,
    pub decision_by: Option<String>,
    pub decision_reason: Option<String>,
}

impl ReviewRequest {
    pub fn new(
        workflow_id: impl Into<String>,
        run_id: Uuid,
        thread_id: impl Into<String>,
        gate: &ApprovalGate,
        checkpoint_id: Option<String>,
        proposed_action: Option<Value>,
        cost_estimate_usd: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            review_id: Uuid::new_v4(),
            workflow_id: workflow_id.into(),
            run_id,
            thread_id: thread_id.into(),
            checkpoint_id,
            step_name: gate.step.clone(),
            status: ReviewStatus::Pending,
            proposed_action,
            cost_estimate_usd,
            risk_level: gate.risk_level,
            created_at: now,
            expires_at: now + Duration::seconds(gate.timeout_seconds as i64),
            decision_at: None,
            decision_by: None,
            decision_reason: None,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ReviewStatus::Pending && self.expires_at < now
    }
}

#[derive(Debug, Default, Clone)]
pub struct ReviewQueue {
    requests: Arc<RwLock<HashMap<Uuid, ReviewRequest>>>,
}

impl ReviewQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, request: ReviewRequest) -> Uuid {
        let id = request.review_id;
        self.requests.write().await.insert(id, request);
        id
    }

    pub async fn get(&self, review_id: Uuid) -> Option<ReviewRequest> {
        self.requests.read().await.get(&review_id).cloned()
    }

    pub async fn list_pending(&self, workflow_id: Option<&str>) -> Vec<ReviewRequest> {
        let requests = self.requests.read().await;
        let mut pending: Vec<ReviewRequest> = requests
            .values()
            .filter(|r| r.status == ReviewStatus::Pending)
            .filter(|r| workflow_id.map(|w| w == r.workflow_id).unwrap_or(true))
            .cloned()
            .collect();
        pending.sort_by_key(|r| std::cmp::Reverse(r.created_at));
        pending
    }

    /// Move every pending request past its deadline to `Expired`. Returns
    /// the requests that were transitioned, so the caller can act on
    /// `on_timeout` policy for each.
    pub async fn mark_expired(&self) -> Vec<ReviewRequest> {
        self.mark_expired_at(Utc::now()).await
    }

    pub async fn mark_expired_at(&self, now: DateTime<Utc>) -> Vec<ReviewRequest> {
        let mut requests = self.requests.write().await;
        let mut expired = Vec::new();
        for request in requests.values_mut() {
            if request.is_expired_at(now) {
                request.status = ReviewStatus::Expired;
                expired.push(request.clone());
            }
        }
        expired
    }

    pub async fn update<F>(&self, review_id: Uuid, f: F) -> Option<ReviewRequest>
    where
        F: FnOnce(&mut ReviewRequest),
    {
        let mut requests = self.requests.write().await;
        let request = requests.get_mut(&review_id)?;
        f(request);
        Some(request.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> ApprovalGate {
        let mut g = ApprovalGate::new("executor");
        g.timeout_seconds = 60;
        g
    }

    #[tokio::test]
    async fn list_pending_filters_by_workflow_and_sorts_newest_first() {
        let queue = ReviewQueue::new();
        let run_id = Uuid::new_v4();
        let first = ReviewRequest::new("wf-a", run_id, "t1", &gate(), None, None, 0.0);
        queue.create(first).await;
        let second = ReviewRequest::new("wf-b", run_id, "t2", &gate(), None, None, 0.0);
        queue.create(second).await;

        let pending = queue.list_pending(Some("wf-a")).await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].workflow_id, "wf-a");
    }

    #[tokio::test]
    async fn mark_expired_transitions_past_deadline_only() {
        let queue = ReviewQueue::new();
        let run_id = Uuid::new_v4();
        let request = ReviewRequest::new("wf-a", run_id, "t1", &gate(), None, None, 0.0);
        let id = queue.create(request).await;

        let future = Utc::now() + Duration::seconds(120);
        let expired = queue.mark_expired_at(future).await;

        assert_eq!(expired.len(), 1);
        assert_eq!(queue.get(id).await.unwrap().status, ReviewStatus::Expired);
    }
}
