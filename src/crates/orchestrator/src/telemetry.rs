//! Tracing adapters and cost tracking for outbound provider calls.
//!
//! Every attempted provider call emits one structured trace span carrying the
//! observed latency, provider, selected policy, and terminal status (gateway
//! end-to-end invariant, §4.3). Every successful call records exactly one
//! [`UsageRecord`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// One accounting row for a completed LLM call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub run_id: Uuid,
    pub provider: String,
    pub model: String,
    pub tokens_prompt: u64,
    pub tokens_completion: u64,
    pub scope: String,
    pub timestamp: DateTime<Utc>,
}

/// In-process sink for usage records. A real deployment forwards these to a
/// metering pipeline; tests and the in-process fallback just append here.
#[derive(Debug, Clone, Default)]
pub struct CostRecorder {
    records: Arc<Mutex<Vec<UsageRecord>>>,
}

impl CostRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, record: UsageRecord) {
        self.records.lock().await.push(record);
    }

    pub async fn for_run(&self, run_id: Uuid) -> Vec<UsageRecord> {
        self.records
            .lock()
            .await
            .iter()
            .filter(|r| r.run_id == run_id)
            .cloned()
            .collect()
    }

    pub async fn total_tokens(&self, run_id: Uuid) -> u64 {
        self.for_run(run_id)
            .await
            .iter()
            .map(|r| r.tokens_prompt + r.tokens_completion)
            .sum()
    }
}

/// Outcome recorded on the provider-call trace span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Retried,
    Failover,
    Failed,
}

/// Emit the one structured span the gateway's end-to-end invariant requires
/// per attempted provider call. `latency_ms` is the observed wall time of the
/// attempt (not including queueing at the rate limiter).
pub fn record_provider_call_span(
    provider: &str,
    policy: &str,
    latency_ms: u64,
    outcome: CallOutcome,
) {
    let outcome_str = match outcome {
        CallOutcome::Success => "success",
        CallOutcome::Retried => "retried",
        CallOutcome::Failover => "failover",
        CallOutcome::Failed => "failed",
    };
    tracing::info!(
        provider,
        policy,
        latency_ms,
        outcome = outcome_str,
        "provider call"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cost_recorder_sums_tokens_per_run() {
        let recorder = CostRecorder::new();
        let run_id = Uuid::new_v4();
        recorder
            .record(UsageRecord {
                run_id,
                provider: "groq".into(),
                model: "llama".into(),
                tokens_prompt: 10,
                tokens_completion: 5,
                scope: "wf-1".into(),
                timestamp: Utc::now(),
            })
            .await;
        recorder
            .record(UsageRecord {
                run_id,
                provider: "groq".into(),
                model: "llama".into(),
                tokens_prompt: 2,
                tokens_completion: 1,
                scope: "wf-1".into(),
                timestamp: Utc::now(),
            })
            .await;

        assert_eq!(recorder.total_tokens(run_id).await, 18);
        assert_eq!(recorder.for_run(Uuid::new_v4()).await.len(), 0);
    }
}
