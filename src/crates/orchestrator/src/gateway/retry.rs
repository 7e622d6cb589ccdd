//! Retry wrapping for gateway call sites.
//!
//! Thin adapter over `tooling::async_utils::retry`'s policy and backoff
//! calculation: the gateway supplies its own [`RetryConfig`], and a failed
//! attempt here always counts as exactly one circuit-breaker failure per
//! physical call — not per retry — by letting the breaker observe only the
//! final outcome of this function, never the intermediate ones.

use crate::config::RetryConfig;
use tooling::async_utils::retry::{is_retryable_error, RetryPolicy};

fn policy_from_config(config: &RetryConfig) -> RetryPolicy {
    RetryPolicy::new(config.max_attempts as usize)
        .with_initial_interval(config.initial_delay_ms as f64 / 1000.0)
        .with_max_interval(config.max_delay_ms as f64 / 1000.0)
        .with_backoff_factor(config.factor)
        .with_jitter(config.jitter)
}

/// Run `operation` under the gateway's retry policy. Stops retrying as soon
/// as `operation`'s error is judged non-transient by [`is_retryable_error`];
/// a non-transient error surfaces immediately on the first attempt.
pub async fn with_gateway_retry<F, Fut, T, E>(
    config: &RetryConfig,
    operation: F,
) -> std::result::Result<T, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = std::result::Result<T, E>>,
    E: std::fmt::Display,
{
    let policy = policy_from_config(config);
    let mut last_error = None;

    for attempt in 0..policy.max_attempts {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => {
                let transient = is_retryable_error(&error.to_string());
                tracing::debug!(attempt = attempt + 1, transient, "gateway call attempt failed: {}", error);

                if !transient || !policy.should_retry(attempt + 1) {
                    return Err(error);
                }

                last_error = Some(error);
                let delay = policy.calculate_delay(attempt);
                tokio::time::sleep(delay).await;
            }
        }
    }

    Err(last_error.expect("loop always assigns an error before falling through"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            factor: 2.0,
            jitter: false,
        }
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let attempts = AtomicUsize::new(0);
        let result: Result<u32, String> = with_gateway_retry(&config(), || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("connection timeout".to_string())
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_permanent_errors() {
        let attempts = AtomicUsize::new(0);
        let result: Result<u32, String> = with_gateway_retry(&config(), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err("400 bad request".to_string()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_max_attempts_on_persistent_transient_error() {
        let attempts = AtomicUsize::new(0);
        let result: Result<u32, String> = with_gateway_retry(&config(), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err("503 service unavailable".to_string()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
