//! Per-(workflow, tenant) rolling/calendar quota windows.
//!
//! Grounded on the original quota manager's window computation and
//! check-and-reserve flow: load-or-create the window row, reserve
//! optimistically, and in `soft` mode never block a call on quota alone.

use crate::config::{EnforcementMode, QuotaConfig, QuotaWindowKind};
use chrono::{DateTime, Datelike, Duration as ChronoDuration, TimeZone, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// `(workflow_id?, tenant_id?)` — an absent part is "global for that axis".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeKey {
    pub workflow_id: Option<String>,
    pub tenant_id: Option<String>,
}

impl ScopeKey {
    pub fn new(workflow_id: Option<String>, tenant_id: Option<String>) -> Self {
        Self {
            workflow_id,
            tenant_id,
        }
    }

    fn as_string(&self) -> String {
        format!(
            "{}:{}",
            self.workflow_id.as_deref().unwrap_or("*"),
            self.tenant_id.as_deref().unwrap_or("*")
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageQuota {
    pub scope: ScopeKey,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub tokens_used: u64,
    pub tokens_limit: u64,
}

fn window_bounds(kind: QuotaWindowKind, window_days: u32, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    match kind {
        QuotaWindowKind::Daily => {
            let start = Utc
                .with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
                .single()
                .unwrap_or(now);
            (start, start + ChronoDuration::days(1))
        }
        QuotaWindowKind::Monthly => {
            let start = Utc
                .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
                .single()
                .unwrap_or(now);
            let (next_year, next_month) = if now.month() == 12 {
                (now.year() + 1, 1)
            } else {
                (now.year(), now.month() + 1)
            };
            let end = Utc
                .with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
                .single()
                .unwrap_or(start + ChronoDuration::days(30));
            (start, end)
        }
        QuotaWindowKind::Rolling => {
            let days = window_days.max(1) as i64;
            (now - ChronoDuration::days(days), now)
        }
    }
}

/// Process-wide quota table, single-writer-per-scope via the map's internal
/// sharding plus per-entry interior mutability.
#[derive(Default)]
pub struct QuotaManager {
    windows: DashMap<String, UsageQuota>,
}

impl QuotaManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn load_or_create(&self, scope: &ScopeKey, config: &QuotaConfig, now: DateTime<Utc>) -> UsageQuota {
        let key = scope.as_string();
        let (window_start, window_end) = window_bounds(config.window_kind, config.window_days, now);

        if let Some(existing) = self.windows.get(&key) {
            if existing.window_start == window_start {
                return existing.clone();
            }
        }

        let fresh = UsageQuota {
            scope: scope.clone(),
            window_start,
            window_end,
            tokens_used: 0,
            tokens_limit: config.default_limit,
        };
        self.windows.insert(key, fresh.clone());
        fresh
    }

    /// Reserve `tokens` against `scope`'s current window. In `soft` mode an
    /// over-limit reservation still succeeds (logged) and still increments
    /// `tokens_used` — usage accounting stays accurate even when enforcement
    /// doesn't block. In `hard` mode an over-limit reservation is rejected and
    /// `tokens_used` is left untouched.
    pub fn check_and_reserve(&self, scope: &ScopeKey, tokens: u64, config: &QuotaConfig) -> bool {
        self.check_and_reserve_at(scope, tokens, config, Utc::now())
    }

    pub fn check_and_reserve_at(
        &self,
        scope: &ScopeKey,
        tokens: u64,
        config: &QuotaConfig,
        now: DateTime<Utc>,
    ) -> bool {
        let key = scope.as_string();
        let mut quota = self.load_or_create(scope, config, now);

        let would_exceed = quota.tokens_used + tokens > quota.tokens_limit;

        if would_exceed && config.enforcement == EnforcementMode::Hard {
            tracing::warn!(scope = %key, tokens_used = quota.tokens_used, tokens, limit = quota.tokens_limit, "quota exceeded, hard rejection");
            return false;
        }

        if would_exceed {
            tracing::warn!(scope = %key, tokens_used = quota.tokens_used, tokens, limit = quota.tokens_limit, "quota exceeded, soft mode continuing");
        }

        quota.tokens_used += tokens;
        self.windows.insert(key, quota);
        true
    }

    /// Idempotent bookkeeping touch, not a reconciliation of reserved vs
    /// actual tokens — see DESIGN.md's Open Question resolution.
    pub fn record_usage(&self, scope: &ScopeKey, _tokens_actual: u64) {
        let key = scope.as_string();
        if let Some(mut entry) = self.windows.get_mut(&key) {
            // touch only; reservation in check_and_reserve is authoritative
            let _ = &mut entry;
        }
    }

    pub fn status(&self, scope: &ScopeKey) -> Option<UsageQuota> {
        self.windows.get(&scope.as_string()).map(|q| q.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn cfg(enforcement: EnforcementMode) -> QuotaConfig {
        QuotaConfig {
            window_days: 1,
            window_kind: QuotaWindowKind::Daily,
            default_limit: 100,
            enforcement,
        }
    }

    #[test]
    fn soft_mode_allows_over_limit_and_increments() {
        let mgr = QuotaManager::new();
        let scope = ScopeKey::new(Some("wf-1".into()), None);
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();

        assert!(mgr.check_and_reserve_at(&scope, 60, &cfg(EnforcementMode::Soft), now));
        assert!(mgr.check_and_reserve_at(&scope, 60, &cfg(EnforcementMode::Soft), now));

        let status = mgr.status(&scope).unwrap();
        assert_eq!(status.tokens_used, 120);
    }

    #[test]
    fn hard_mode_rejects_without_incrementing() {
        let mgr = QuotaManager::new();
        let scope = ScopeKey::new(Some("wf-2".into()), None);
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();

        assert!(mgr.check_and_reserve_at(&scope, 60, &cfg(EnforcementMode::Hard), now));
        assert!(!mgr.check_and_reserve_at(&scope, 60, &cfg(EnforcementMode::Hard), now));

        let status = mgr.status(&scope).unwrap();
        assert_eq!(status.tokens_used, 60);
    }

    #[test]
    fn distinct_scopes_track_independent_windows() {
        let mgr = QuotaManager::new();
        let a = ScopeKey::new(Some("wf-a".into()), None);
        let b = ScopeKey::new(Some("wf-b".into()), None);
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();

        mgr.check_and_reserve_at(&a, 10, &cfg(EnforcementMode::Soft), now);
        assert!(mgr.status(&b).is_none());
        assert_eq!(mgr.status(&a).unwrap().tokens_used, 10);
    }
}
