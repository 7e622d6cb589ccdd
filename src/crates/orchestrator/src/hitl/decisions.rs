//! Decision submission: the one-shot pending -> decided transition.
//!
//! Grounded on the original `DecisionService.submit_decision`: looks up the
//! request, rejects if it isn't still `Pending`, and records actor/reason
//! alongside the new status. Workflow resumption is the caller's job, not
//! this module's — same division of responsibility as the original.

use super::queue::{ReviewQueue, ReviewStatus};
use crate::{OrchestratorError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
    RequestChanges,
}

impl Decision {
    fn resulting_status(self) -> ReviewStatus {
        match self {
            Decision::Approve => ReviewStatus::Approved,
            Decision::Reject | Decision::RequestChanges => ReviewStatus::Rejected,
        }
    }
}

pub async fn submit_decision(
    queue: &ReviewQueue,
    review_id: Uuid,
    decision: Decision,
    actor: impl Into<String>,
    reason: Option<String>,
) -> Result<super::queue::ReviewRequest> {
    let actor = actor.into();
    let current = queue
        .get(review_id)
        .await
        .ok_or_else(|| OrchestratorError::InvalidRunState(format!("review {} not found", review_id)))?;

    if current.status != ReviewStatus::Pending {
        return Err(OrchestratorError::HitlDecisionConflict {
            review_id: review_id.to_string(),
            existing_decision: format!("{:?}", current.status),
        });
    }

    let updated = queue
        .update(review_id, |request| {
            request.status = decision.resulting_status();
            request.decision_at = Some(Utc::now());
            request.decision_by = Some(actor);
            request.decision_reason = reason;
        })
        .await
        .expect("review existed a moment ago under the same lock discipline");

    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hitl::gates::ApprovalGate;
    use crate::hitl::queue::ReviewRequest;

    #[tokio::test]
    async fn approve_transitions_to_approved() {
        let queue = ReviewQueue::new();
        let run_id = Uuid::new_v4();
        let request = ReviewRequest::new("wf", run_id, "t1", &ApprovalGate::new("executor"), None, None, 0.0);
        let id = queue.create(request).await;

        let updated = submit_decision(&queue, id, Decision::Approve, "alice", None)
            .await
            .unwrap();
        assert_eq!(updated.status, ReviewStatus::Approved);
        assert_eq!(updated.decision_by.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn second_decision_conflicts() {
        let queue = ReviewQueue::new();
        let run_id = Uuid::new_v4();
        let request = ReviewRequest::new("wf", run_id, "t1", &ApprovalGate::new("executor"), None, None, 0.0);
        let id = queue.create(request).await;

        submit_decision(&queue, id, Decision::Approve, "alice", None)
            .await
            .unwrap();

        let second = submit_decision(&queue, id, Decision::Reject, "bob", None).await;
        assert!(matches!(second, Err(OrchestratorError::HitlDecisionConflict { .. })));
    }
}
