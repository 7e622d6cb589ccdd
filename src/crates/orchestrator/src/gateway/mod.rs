//! Provider gateway: the layered call path every outbound LLM request takes.
//!
//! Composed of five sub-layers ordered outermost to innermost: quota ->
//! router -> rate limiter -> circuit breaker -> retry -> call. Quota and
//! rate limiting gate whether a call is attempted at all; routing picks
//! which provider; the breaker and retry govern how failures within that
//! one provider are handled.

pub mod quota;
pub mod rate_limiter;
pub mod retry;
pub mod router;

use crate::config::OrchestratorConfig;
use crate::telemetry::{record_provider_call_span, CallOutcome, CostRecorder, UsageRecord};
use crate::{OrchestratorError, Result};
use quota::{QuotaManager, ScopeKey};
use rate_limiter::{InProcessRateLimiter, RateLimiterBackend};
use router::{Admission, BreakerRegistry, ProviderRegistry};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tooling::async_utils::retry::is_retryable_error;
use uuid::Uuid;

/// Everything an outbound call needs to know about its caller.
pub struct CallContext {
    pub run_id: Uuid,
    pub scope: ScopeKey,
    pub estimated_tokens: u64,
}

pub struct ProviderGateway {
    config: OrchestratorConfig,
    quota: QuotaManager,
    registry: ProviderRegistry,
    rate_limiter: Arc<dyn RateLimiterBackend>,
    breakers: BreakerRegistry,
    costs: CostRecorder,
}

impl ProviderGateway {
    pub fn new(config: OrchestratorConfig) -> Self {
        let rate_limiter = Arc::new(InProcessRateLimiter::new(
            config.rate_limit.provider_rate_per_sec.clone(),
        ));
        Self {
            registry: ProviderRegistry::seeded(),
            quota: QuotaManager::new(),
            rate_limiter,
            breakers: BreakerRegistry::new(),
            costs: CostRecorder::new(),
            config,
        }
    }

    /// Build a gateway against a caller-supplied rate limiter backend, e.g.
    /// [`rate_limiter::SharedStoreRateLimiter`] for a multi-process deployment
    /// where buckets must be coordinated across workers.
    pub fn with_rate_limiter(config: OrchestratorConfig, rate_limiter: Arc<dyn RateLimiterBackend>) -> Self {
        Self {
            registry: ProviderRegistry::seeded(),
            quota: QuotaManager::new(),
            rate_limiter,
            breakers: BreakerRegistry::new(),
            costs: CostRecorder::new(),
            config,
        }
    }

    pub fn cost_recorder(&self) -> &CostRecorder {
        &self.costs
    }

    /// Run `call` through quota -> router -> rate limiter -> breaker ->
    /// retry. `call` receives the chosen provider name and model name and
    /// returns `(output, tokens_prompt, tokens_completion)` on success, or a
    /// `String` error message on failure (judged transient/permanent by
    /// `tooling`'s retry heuristic).
    pub async fn call<F, Fut>(
        &self,
        ctx: &CallContext,
        model: &str,
        call: F,
    ) -> Result<serde_json::Value>
    where
        F: Fn(String) -> Fut,
        Fut: std::future::Future<Output = std::result::Result<(serde_json::Value, u64, u64), String>>,
    {
        let quota_ok = self
            .quota
            .check_and_reserve(&ctx.scope, ctx.estimated_tokens, &self.config.quota);
        if !quota_ok {
            return Err(OrchestratorError::QuotaExceeded {
                scope: format!("{:?}", ctx.scope),
                used: self.quota.status(&ctx.scope).map(|q| q.tokens_used).unwrap_or(0),
                requested: ctx.estimated_tokens,
                limit: self.config.quota.default_limit,
            });
        }

        let candidates = self.registry.candidates(self.config.rate_limit.policy);
        if candidates.is_empty() {
            return Err(OrchestratorError::Internal(
                "no enabled providers configured".to_string(),
            ));
        }

        let mut last_err = None;
        for candidate in &candidates {
            let provider = candidate.name.as_str();
            let breaker = self.breakers.get_or_create(provider, &self.config.breaker);

            let admission = breaker.admit();
            if admission == Admission::Rejected {
                last_err = Some(OrchestratorError::CircuitOpen {
                    name: provider.to_string(),
                    retry_after_ms: breaker.retry_after_ms(),
                });
                continue;
            }

            if self.config.rate_limit.enabled {
                let timeout = Duration::from_millis(self.config.rate_limit.acquire_timeout_ms);
                let granted = self
                    .rate_limiter
                    .acquire(provider, 1.0, timeout)
                    .await;
                if !granted {
                    self.registry.mark_degraded(
                        provider,
                        Duration::from_secs(self.config.rate_limit.provider_cooldown_sec),
                    );
                    last_err = Some(OrchestratorError::RateLimitTimeout {
                        provider: provider.to_string(),
                        waited_ms: timeout.as_millis() as u64,
                    });
                    continue;
                }
            }

            let started = Instant::now();
            let attempt_result = retry::with_gateway_retry(&self.config.retry, || {
                call(model.to_string())
            })
            .await;
            let latency_ms = started.elapsed().as_millis() as u64;

            match attempt_result {
                Ok((output, tokens_prompt, tokens_completion)) => {
                    breaker.on_success();
                    record_provider_call_span(
                        provider,
                        &format!("{:?}", self.config.rate_limit.policy),
                        latency_ms,
                        CallOutcome::Success,
                    );
                    self.costs
                        .record(UsageRecord {
                            run_id: ctx.run_id,
                            provider: provider.to_string(),
                            model: model.to_string(),
                            tokens_prompt,
                            tokens_completion,
                            scope: format!("{:?}", ctx.scope),
                            timestamp: chrono::Utc::now(),
                        })
                        .await;
                    self.quota.record_usage(&ctx.scope, tokens_prompt + tokens_completion);
                    return Ok(output);
                }
                Err(message) if !is_retryable_error(&message) => {
                    // Permanent (non-retryable) error: surface immediately,
                    // no failover (spec §4.3.3 step 3 / §7). Doesn't count
                    // against the breaker — the provider isn't unhealthy,
                    // the request was invalid.
                    record_provider_call_span(
                        provider,
                        &format!("{:?}", self.config.rate_limit.policy),
                        latency_ms,
                        CallOutcome::Failed,
                    );
                    return Err(OrchestratorError::ProviderPermanent {
                        provider: provider.to_string(),
                        message,
                    });
                }
                Err(message) => {
                    breaker.on_failure();
                    self.registry.mark_degraded(
                        provider,
                        Duration::from_secs(self.config.rate_limit.provider_cooldown_sec),
                    );
                    record_provider_call_span(
                        provider,
                        &format!("{:?}", self.config.rate_limit.policy),
                        latency_ms,
                        CallOutcome::Failover,
                    );
                    last_err = Some(OrchestratorError::ProviderTransient {
                        provider: provider.to_string(),
                        message,
                    });
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            OrchestratorError::Internal("all providers exhausted with no recorded error".to_string())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrchestratorConfig;

    fn ctx() -> CallContext {
        CallContext {
            run_id: Uuid::new_v4(),
            scope: ScopeKey::new(Some("wf-test".to_string()), None),
            estimated_tokens: 10,
        }
    }

    #[tokio::test]
    async fn successful_call_records_usage() {
        let gateway = ProviderGateway::new(OrchestratorConfig::default());
        let context = ctx();
        let result = gateway
            .call(&context, "test-model", |_provider| async {
                Ok((serde_json::json!({"ok": true}), 5, 3))
            })
            .await
            .unwrap();

        assert_eq!(result, serde_json::json!({"ok": true}));
        assert_eq!(gateway.cost_recorder().total_tokens(context.run_id).await, 8);
    }

    #[tokio::test]
    async fn permanent_failure_surfaces_without_failover() {
        let gateway = ProviderGateway::new(OrchestratorConfig::default());
        let context = ctx();
        let attempts = std::sync::atomic::AtomicUsize::new(0);

        let result = gateway
            .call(&context, "test-model", |_provider| {
                attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async move { Err("400 bad request".to_string()) }
            })
            .await;

        match result {
            Err(OrchestratorError::ProviderPermanent { provider, .. }) => {
                assert_eq!(provider, "primary");
            }
            other => panic!("expected ProviderPermanent, got {other:?}"),
        }
        // Only the first (highest-priority) candidate was ever attempted —
        // a permanent error never triggers failover to "secondary".
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_failure_fails_over_to_next_provider() {
        // max_attempts = 1 so a retryable failure surfaces from the first
        // provider immediately (no backoff sleep) and triggers failover
        // rather than burning the default backoff schedule in-test.
        let mut config = OrchestratorConfig::default();
        config.retry.max_attempts = 1;
        let gateway = ProviderGateway::new(config);
        let context = ctx();
        let attempt = std::sync::atomic::AtomicUsize::new(0);

        let result = gateway
            .call(&context, "test-model", |provider| {
                let n = attempt.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async move {
                    if provider == "primary" {
                        Err("503 service unavailable".to_string())
                    } else {
                        Ok((serde_json::json!({"n": n}), 1, 1))
                    }
                }
            })
            .await;

        assert!(result.is_ok());
    }
}
