//! Configuration surface for the orchestration substrate.
//!
//! Provides YAML/TOML configuration loading (`$include` directives, environment
//! variable expansion, deep merge — see [`loader`]) plus the typed
//! [`OrchestratorConfig`] covering rate limiting, quota, routing, retry, the
//! circuit breaker, HITL, and shadow/versioning knobs.

pub mod loader;

pub use loader::{deep_merge, load_yaml_config, load_yaml_file};

use serde::{Deserialize, Serialize};

/// Master configuration, deserializable from YAML/TOML with environment overrides
/// via `loader::load_yaml_config`. Every field maps to a row of the configuration
/// surface: `section.key` in this struct corresponds to `section.key` in the table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub rate_limit: RateLimitConfig,
    pub quota: QuotaConfig,
    pub retry: RetryConfig,
    pub breaker: BreakerConfig,
    pub hitl: HitlConfig,
    pub shadow: ShadowConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig::default(),
            quota: QuotaConfig::default(),
            retry: RetryConfig::default(),
            breaker: BreakerConfig::default(),
            hitl: HitlConfig::default(),
            shadow: ShadowConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Master switch for gateway rate limiting.
    pub enabled: bool,
    /// `rate_limit.provider.<name>.rate_per_sec` — per-provider bucket refill rate.
    pub provider_rate_per_sec: std::collections::HashMap<String, f64>,
    pub policy: RoutingPolicyKind,
    pub provider_cooldown_sec: u64,
    /// Deadline for a single bucket `acquire` call, independent of the
    /// circuit breaker's recovery timeout.
    pub acquire_timeout_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider_rate_per_sec: std::collections::HashMap::new(),
            policy: RoutingPolicyKind::Primary,
            provider_cooldown_sec: 30,
            acquire_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingPolicyKind {
    Primary,
    CostWeighted,
    LatencyWeighted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaWindowKind {
    Daily,
    Monthly,
    Rolling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementMode {
    Soft,
    Hard,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// `quota.window_days` — 1 (daily), 30 (monthly-ish), or N (rolling).
    pub window_days: u32,
    pub window_kind: QuotaWindowKind,
    pub default_limit: u64,
    pub enforcement: EnforcementMode,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            window_days: 1,
            window_kind: QuotaWindowKind::Daily,
            default_limit: 1_000_000,
            enforcement: EnforcementMode::Soft,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub factor: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            factor: 2.0,
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HitlConfig {
    pub default_timeout_seconds: u64,
}

impl Default for HitlConfig {
    fn default() -> Self {
        Self {
            default_timeout_seconds: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    pub sample_rate: f64,
    pub divergence_threshold: f64,
    pub window: usize,
    /// `shadow.alert_rate` — fraction of the last `window` comparisons that
    /// must score below `divergence_threshold` before an `ALERT` audit entry
    /// fires (spec §4.6 Monitoring: "the fraction of samples below a
    /// similarity threshold exceeds a configured rate").
    pub alert_rate: f64,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            sample_rate: 0.0,
            divergence_threshold: 0.85,
            window: 50,
            alert_rate: 0.2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_surface() {
        let cfg = OrchestratorConfig::default();
        assert!(cfg.rate_limit.enabled);
        assert_eq!(cfg.quota.window_days, 1);
        assert_eq!(cfg.quota.enforcement, EnforcementMode::Soft);
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.breaker.failure_threshold, 5);
        assert_eq!(cfg.shadow.divergence_threshold, 0.85);
    }

    #[test]
    fn deserializes_partial_yaml_with_defaults() {
        let yaml = r#"
quota:
  enforcement: hard
  default_limit: 5000
retry:
  max_attempts: 5
"#;
        let cfg: OrchestratorConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.quota.enforcement, EnforcementMode::Hard);
        assert_eq!(cfg.quota.default_limit, 5000);
        assert_eq!(cfg.retry.max_attempts, 5);
        // untouched sections keep their defaults
        assert_eq!(cfg.breaker.failure_threshold, 5);
    }
}
