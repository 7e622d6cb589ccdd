//! Provider selection and per-provider circuit breaking.
//!
//! Grounded on the original provider registry/router (static seed data plus
//! a policy-ordered candidate list) and the original circuit breaker's
//! three-state machine. A breaker guards one provider; the router asks each
//! candidate's breaker whether it's eligible before routing to it.

use crate::config::{BreakerConfig, RoutingPolicyKind};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Static facts about a provider, seeded at startup. Cost and latency are
/// used only to order candidates under the weighted policies; `enabled`
/// lets an operator pull a provider out of rotation without deleting it.
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    pub name: String,
    pub priority: u32,
    pub cost_per_1k_tokens: f64,
    pub avg_latency_ms: f64,
    pub enabled: bool,
}

#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: Vec<ProviderProfile>,
    /// Process-wide "degraded until" timestamp per provider (spec §4.3.3):
    /// set by the gateway's failover loop on a retryable failure, cleared
    /// implicitly once `Instant::now()` passes it.
    degraded_until: Mutex<HashMap<String, Instant>>,
}

impl ProviderRegistry {
    pub fn new(providers: Vec<ProviderProfile>) -> Self {
        Self {
            providers,
            degraded_until: Mutex::new(HashMap::new()),
        }
    }

    /// Mark `provider` degraded for `cooldown`, excluding it from
    /// [`candidates`](Self::candidates) until the cooldown elapses.
    pub fn mark_degraded(&self, provider: &str, cooldown: Duration) {
        self.degraded_until
            .lock()
            .insert(provider.to_string(), Instant::now() + cooldown);
    }

    fn is_degraded(&self, provider: &str) -> bool {
        self.degraded_until
            .lock()
            .get(provider)
            .map(|until| Instant::now() < *until)
            .unwrap_or(false)
    }

    /// Seed registry covering the providers the gateway ships rate limits
    /// for out of the box; real deployments override this via config.
    pub fn seeded() -> Self {
        Self::new(vec![
            ProviderProfile {
                name: "primary".to_string(),
                priority: 0,
                cost_per_1k_tokens: 1.0,
                avg_latency_ms: 400.0,
                enabled: true,
            },
            ProviderProfile {
                name: "secondary".to_string(),
                priority: 1,
                cost_per_1k_tokens: 0.6,
                avg_latency_ms: 700.0,
                enabled: true,
            },
        ])
    }

    /// Candidates ordered for `policy`, enabled and non-degraded providers only.
    pub fn candidates(&self, policy: RoutingPolicyKind) -> Vec<ProviderProfile> {
        let mut candidates: Vec<ProviderProfile> = self
            .providers
            .iter()
            .filter(|p| p.enabled && !self.is_degraded(&p.name))
            .cloned()
            .collect();

        match policy {
            RoutingPolicyKind::Primary => candidates.sort_by_key(|p| p.priority),
            RoutingPolicyKind::CostWeighted => {
                candidates.sort_by(|a, b| {
                    a.cost_per_1k_tokens
                        .partial_cmp(&b.cost_per_1k_tokens)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
            }
            RoutingPolicyKind::LatencyWeighted => {
                candidates.sort_by(|a, b| {
                    a.avg_latency_ms
                        .partial_cmp(&b.avg_latency_ms)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
            }
        }

        candidates
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct BreakerInner {
    state: BreakerState,
    failure_count: u32,
    opened_at: Option<Instant>,
    half_open_probe_in_flight: bool,
}

/// Closed -> Open on `failure_threshold` consecutive failures. Open -> HalfOpen
/// once `recovery_timeout` has elapsed, admitting exactly one probe call.
/// HalfOpen -> Closed on that probe's success, back to Open on its failure.
pub struct CircuitBreaker {
    inner: Mutex<BreakerInner>,
    failure_threshold: u32,
    recovery_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    ProbeAllowed,
    Rejected,
}

impl CircuitBreaker {
    pub fn new(config: &BreakerConfig) -> Self {
        Self {
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failure_count: 0,
                opened_at: None,
                half_open_probe_in_flight: false,
            }),
            failure_threshold: config.failure_threshold,
            recovery_timeout: Duration::from_millis(config.recovery_timeout_ms),
        }
    }

    /// Decide whether a call may proceed right now. A `ProbeAllowed` result
    /// must be followed by exactly one `on_success`/`on_failure` call — the
    /// caller owns that single in-flight probe.
    pub fn admit(&self) -> Admission {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => Admission::Allowed,
            BreakerState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.recovery_timeout && !inner.half_open_probe_in_flight {
                    inner.state = BreakerState::HalfOpen;
                    inner.half_open_probe_in_flight = true;
                    Admission::ProbeAllowed
                } else {
                    Admission::Rejected
                }
            }
            BreakerState::HalfOpen => {
                if inner.half_open_probe_in_flight {
                    Admission::Rejected
                } else {
                    inner.half_open_probe_in_flight = true;
                    Admission::ProbeAllowed
                }
            }
        }
    }

    pub fn on_success(&self) {
        let mut inner = self.inner.lock();
        inner.state = BreakerState::Closed;
        inner.failure_count = 0;
        inner.opened_at = None;
        inner.half_open_probe_in_flight = false;
    }

    pub fn on_failure(&self) {
        let mut inner = self.inner.lock();
        inner.half_open_probe_in_flight = false;
        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
            }
            BreakerState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            BreakerState::Open => {}
        }
    }

    pub fn retry_after_ms(&self) -> u64 {
        let inner = self.inner.lock();
        match inner.opened_at {
            Some(opened_at) => {
                let elapsed = opened_at.elapsed();
                self.recovery_timeout.saturating_sub(elapsed).as_millis() as u64
            }
            None => 0,
        }
    }
}

/// One breaker per provider name, created lazily.
#[derive(Default)]
pub struct BreakerRegistry {
    breakers: Mutex<HashMap<String, std::sync::Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, provider: &str, config: &BreakerConfig) -> std::sync::Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock();
        breakers
            .entry(provider.to_string())
            .or_insert_with(|| std::sync::Arc::new(CircuitBreaker::new(config)))
            .clone()
    }
}
