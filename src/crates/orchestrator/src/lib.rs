//! Orchestration substrate: job dispatch, the provider gateway, event fan-out,
//! human-in-the-loop review, and deployment/shadow-run versioning.
//!
//! This crate wires together [`langgraph_core`]'s graph executor with the
//! reliability and coordination layers a production multi-agent run needs:
//! rate limiting, quota, circuit breaking and retry in front of every outbound
//! provider call; a durable-ish run lifecycle with idempotent re-delivery;
//! pub/sub event streaming with an in-memory fallback; approval gates that
//! pause and resume graph execution; and snapshot/shadow deployment tracking.

pub mod config;
pub mod dispatch;
pub mod events;
pub mod gateway;
pub mod hitl;
pub mod run;
pub mod telemetry;
pub mod versioning;

use thiserror::Error;

/// Errors that can escape the orchestration substrate to a caller.
///
/// Maps onto the error taxonomy governing gateway/dispatcher/HITL/checkpoint
/// failures: each variant names its recovery policy in its doc comment so
/// callers don't have to cross-reference a separate table.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Input failed validation before any call was attempted. No retry.
    #[error("validation error: {0}")]
    Validation(String),

    /// A hard-mode quota was exceeded; the call was not made and nothing was
    /// reserved.
    #[error("quota exceeded for scope {scope}: used {used} + requested {requested} > limit {limit}")]
    QuotaExceeded {
        scope: String,
        used: u64,
        requested: u64,
        limit: u64,
    },

    /// The rate limiter could not grant tokens before the caller's deadline.
    /// Recovery: the gateway should treat this as grounds for failover.
    #[error("rate limit acquire timed out for provider {provider} after {waited_ms}ms")]
    RateLimitTimeout { provider: String, waited_ms: u64 },

    /// The circuit for a provider is open; the call was rejected without
    /// invoking the inner function. Recovery: failover to the next provider.
    #[error("circuit open for {name}, retry after {retry_after_ms}ms")]
    CircuitOpen { name: String, retry_after_ms: u64 },

    /// A provider call failed in a way classified as retryable (429/5xx/timeout).
    /// Recovery: retried internally by the gateway; escapes only once retries
    /// and failover are both exhausted.
    #[error("provider {provider} transient error: {message}")]
    ProviderTransient { provider: String, message: String },

    /// A provider call failed in a way classified as permanent (other 4xx).
    /// Recovery: surfaced immediately, no retry or failover.
    #[error("provider {provider} permanent error: {message}")]
    ProviderPermanent { provider: String, message: String },

    /// The checkpointer could not commit a step after an upsert retry.
    #[error("checkpoint conflict for thread {thread_id}: {message}")]
    CheckpointConflict { thread_id: String, message: String },

    /// A review request received a second decision after already being
    /// decided.
    #[error("review {review_id} already decided as {existing_decision}")]
    HitlDecisionConflict {
        review_id: String,
        existing_decision: String,
    },

    /// The run exceeded its overall wall-clock deadline.
    #[error("run {run_id} exceeded its deadline of {deadline_secs}s")]
    WorkflowTimeout { run_id: String, deadline_secs: u64 },

    /// A run was asked for that doesn't exist, or a state transition was
    /// attempted that the run's current status forbids.
    #[error("invalid run state: {0}")]
    InvalidRunState(String),

    /// The underlying graph executor returned an error.
    #[error("graph execution error: {0}")]
    Graph(#[from] langgraph_core::error::GraphError),

    /// Checkpoint storage error surfaced from langgraph-checkpoint directly
    /// (outside of the conflict-retry path above).
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] langgraph_checkpoint::CheckpointError),

    /// Configuration could not be loaded or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization failure (checkpoint payloads, event bodies, snapshots).
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Catch-all for conditions that should not occur; always audit-logged.
    #[error("internal error: {0}")]
    Internal(String),

    /// Generic error not otherwise classified — kept for compatibility with
    /// call sites that only have a free-form message.
    #[error("orchestrator error: {0}")]
    General(String),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
