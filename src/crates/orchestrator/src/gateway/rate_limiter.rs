//! Per-provider token bucket rate limiting.
//!
//! One bucket per `provider_name`, `capacity == rate_per_sec` (burst equals
//! the steady-state rate per §4.3.1). Refill-and-acquire is atomic under the
//! bucket's own lock; two backends share the [`RateLimiterBackend`] trait so
//! the gateway can swap an in-process map for a shared-store implementation
//! without touching call sites.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

/// Observable bucket status, queryable without mutating it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketStatus {
    pub available_tokens: f64,
    pub rate_per_sec: f64,
    pub max_tokens: f64,
}

/// The two polymorphic capability sets named by the design notes: an
/// in-process mutex-protected map, and a shared-store backend where
/// refill-and-acquire runs as a single atomic script. Both satisfy the same
/// contract so the gateway is agnostic to which is wired in.
#[async_trait]
pub trait RateLimiterBackend: Send + Sync {
    /// Attempt to acquire `tokens` from `provider`'s bucket, retrying until
    /// `timeout` elapses. Returns `true` if granted, `false` on timeout.
    async fn acquire(&self, provider: &str, tokens: f64, timeout: Duration) -> bool;

    /// Return up to `tokens` to the bucket, capped at capacity. Used only to
    /// cancel a reservation when the inner call was never attempted.
    async fn release(&self, provider: &str, tokens: f64);

    async fn get_status(&self, provider: &str) -> Option<BucketStatus>;
}

struct Bucket {
    tokens: f64,
    capacity: f64,
    rate_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(rate_per_sec: f64) -> Self {
        Self {
            tokens: rate_per_sec,
            capacity: rate_per_sec,
            rate_per_sec,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    fn try_take(&mut self, tokens: f64) -> bool {
        self.refill();
        if self.tokens >= tokens {
            self.tokens -= tokens;
            true
        } else {
            false
        }
    }

    fn give_back(&mut self, tokens: f64) {
        self.refill();
        self.tokens = (self.tokens + tokens).min(self.capacity);
    }

    fn status(&mut self) -> BucketStatus {
        self.refill();
        BucketStatus {
            available_tokens: self.tokens,
            rate_per_sec: self.rate_per_sec,
            max_tokens: self.capacity,
        }
    }
}

/// In-process backend: one mutex per provider bucket, buckets created lazily
/// on first use at a configured `rate_per_sec` (default 10.0 if unconfigured).
pub struct InProcessRateLimiter {
    buckets: DashMap<String, Arc<Mutex<Bucket>>>,
    default_rate_per_sec: f64,
    rates: std::collections::HashMap<String, f64>,
}

impl InProcessRateLimiter {
    pub fn new(rates: std::collections::HashMap<String, f64>) -> Self {
        Self {
            buckets: DashMap::new(),
            default_rate_per_sec: 10.0,
            rates,
        }
    }

    fn bucket_for(&self, provider: &str) -> Arc<Mutex<Bucket>> {
        self.buckets
            .entry(provider.to_string())
            .or_insert_with(|| {
                let rate = self
                    .rates
                    .get(provider)
                    .copied()
                    .unwrap_or(self.default_rate_per_sec);
                Arc::new(Mutex::new(Bucket::new(rate)))
            })
            .clone()
    }
}

#[async_trait]
impl RateLimiterBackend for InProcessRateLimiter {
    async fn acquire(&self, provider: &str, tokens: f64, timeout: Duration) -> bool {
        let bucket = self.bucket_for(provider);
        let deadline = Instant::now() + timeout;

        loop {
            {
                let mut b = bucket.lock().await;
                if b.try_take(tokens) {
                    return true;
                }
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(Duration::from_millis(10)).await;
        }
    }

    async fn release(&self, provider: &str, tokens: f64) {
        let bucket = self.bucket_for(provider);
        bucket.lock().await.give_back(tokens);
    }

    async fn get_status(&self, provider: &str) -> Option<BucketStatus> {
        if !self.buckets.contains_key(provider) {
            return None;
        }
        let bucket = self.bucket_for(provider);
        Some(bucket.lock().await.status())
    }
}

/// Lua script performing the refill-and-acquire described in §4.3.1 as a
/// single atomic operation server-side: recompute tokens from elapsed time,
/// attempt to subtract `requested`, persist the new state, and report
/// whether the acquisition was granted along with the resulting balance.
/// Calling it with `requested = 0` is a refill-only "peek" used by
/// `get_status`, since zero tokens is always grantable.
const REFILL_AND_ACQUIRE_SCRIPT: &str = r#"
local key = KEYS[1]
local capacity = tonumber(ARGV[1])
local rate = tonumber(ARGV[2])
local requested = tonumber(ARGV[3])
local now_ms = tonumber(ARGV[4])

local tokens = tonumber(redis.call('HGET', key, 'tokens'))
local last_refill = tonumber(redis.call('HGET', key, 'last_refill_ms'))
if tokens == nil then
    tokens = capacity
    last_refill = now_ms
end

local elapsed = math.max(0, now_ms - last_refill) / 1000.0
tokens = math.min(capacity, tokens + elapsed * rate)

local granted = 0
if tokens >= requested then
    tokens = tokens - requested
    granted = 1
end

redis.call('HSET', key, 'tokens', tostring(tokens), 'last_refill_ms', now_ms, 'rate_per_sec', rate, 'capacity', capacity)
redis.call('EXPIRE', key, 3600)
return {granted, tostring(tokens)}
"#;

/// Gives back up to `capacity` tokens, refilling first so the cap is applied
/// against an up-to-date balance rather than a stale one.
const RELEASE_SCRIPT: &str = r#"
local key = KEYS[1]
local capacity = tonumber(ARGV[1])
local give_back = tonumber(ARGV[2])
local now_ms = tonumber(ARGV[3])

local tokens = tonumber(redis.call('HGET', key, 'tokens'))
local last_refill = tonumber(redis.call('HGET', key, 'last_refill_ms'))
local rate = tonumber(redis.call('HGET', key, 'rate_per_sec'))
if tokens == nil then
    tokens = capacity
    last_refill = now_ms
    rate = capacity
end

local elapsed = math.max(0, now_ms - last_refill) / 1000.0
tokens = math.min(capacity, tokens + elapsed * rate + give_back)

redis.call('HSET', key, 'tokens', tostring(tokens), 'last_refill_ms', now_ms, 'rate_per_sec', rate, 'capacity', capacity)
redis.call('EXPIRE', key, 3600)
return tostring(tokens)
"#;

/// Shared-store backend: the same token-bucket contract as
/// [`InProcessRateLimiter`], but with refill-and-acquire run as a single
/// atomic Redis Lua script so multiple orchestrator processes coordinate
/// against one set of buckets (§4.3.1, §9 "two backends MUST be supported").
pub struct SharedStoreRateLimiter {
    manager: redis::aio::ConnectionManager,
    refill_and_acquire: redis::Script,
    release_script: redis::Script,
    default_rate_per_sec: f64,
    rates: std::collections::HashMap<String, f64>,
}

impl SharedStoreRateLimiter {
    pub async fn connect(
        redis_url: &str,
        rates: std::collections::HashMap<String, f64>,
    ) -> redis::RedisResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = redis::aio::ConnectionManager::new(client).await?;
        Ok(Self {
            manager,
            refill_and_acquire: redis::Script::new(REFILL_AND_ACQUIRE_SCRIPT),
            release_script: redis::Script::new(RELEASE_SCRIPT),
            default_rate_per_sec: 10.0,
            rates,
        })
    }

    fn rate_for(&self, provider: &str) -> f64 {
        self.rates
            .get(provider)
            .copied()
            .unwrap_or(self.default_rate_per_sec)
    }

    fn bucket_key(provider: &str) -> String {
        format!("orchestrator:rate_limit:{provider}")
    }

    async fn try_acquire(&self, provider: &str, tokens: f64) -> redis::RedisResult<(bool, f64)> {
        let rate = self.rate_for(provider);
        let now_ms = chrono::Utc::now().timestamp_millis();
        let mut conn = self.manager.clone();
        let (granted, remaining): (i64, String) = self
            .refill_and_acquire
            .key(Self::bucket_key(provider))
            .arg(rate)
            .arg(rate)
            .arg(tokens)
            .arg(now_ms)
            .invoke_async(&mut conn)
            .await?;
        let remaining: f64 = remaining.parse().unwrap_or(0.0);
        Ok((granted == 1, remaining))
    }
}

#[async_trait]
impl RateLimiterBackend for SharedStoreRateLimiter {
    async fn acquire(&self, provider: &str, tokens: f64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            match self.try_acquire(provider, tokens).await {
                Ok((true, _)) => return true,
                Ok((false, _)) => {}
                Err(err) => {
                    tracing::warn!(provider, error = %err, "shared-store rate limiter unreachable, retrying");
                }
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(Duration::from_millis(10)).await;
        }
    }

    async fn release(&self, provider: &str, tokens: f64) {
        let rate = self.rate_for(provider);
        let now_ms = chrono::Utc::now().timestamp_millis();
        let mut conn = self.manager.clone();
        let result: redis::RedisResult<String> = self
            .release_script
            .key(Self::bucket_key(provider))
            .arg(rate)
            .arg(tokens)
            .arg(now_ms)
            .invoke_async(&mut conn)
            .await;
        if let Err(err) = result {
            tracing::warn!(provider, error = %err, "shared-store rate limiter release failed");
        }
    }

    async fn get_status(&self, provider: &str) -> Option<BucketStatus> {
        match self.try_acquire(provider, 0.0).await {
            Ok((_, available_tokens)) => Some(BucketStatus {
                available_tokens,
                rate_per_sec: self.rate_for(provider),
                max_tokens: self.rate_for(provider),
            }),
            Err(err) => {
                tracing::warn!(provider, error = %err, "shared-store rate limiter status unavailable");
                None
            }
        }
    }
}
