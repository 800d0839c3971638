//! Bounded retry with exponential backoff for calls to flaky collaborators.

use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;

/// `max_attempts` counts the first call, so `1` means "never retry".
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_multiplier() -> f64 { 2.0 }

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay_ms: 200,
            max_delay_ms: 5_000,
            multiplier: default_multiplier(),
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        let ms = delay.as_millis() as u64;
        Self {
            max_attempts,
            initial_delay_ms: ms,
            max_delay_ms: ms,
            multiplier: 1.0,
        }
    }

    /// Delay before retry number `retry` (0-based): initial * multiplier^retry, capped.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let raw = self.initial_delay_ms as f64 * self.multiplier.powi(retry as i32);
        let capped = raw.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// Longest a full run can take when every attempt uses up `per_attempt`.
    pub fn worst_case(&self, per_attempt: Duration) -> Duration {
        let attempts = self.max_attempts.max(1);
        let backoff: Duration = (0..attempts - 1).map(|retry| self.delay_for_retry(retry)).sum();
        per_attempt * attempts + backoff
    }
}

/// Calls `operation` until it succeeds, `is_retryable` rejects the error, or
/// the policy runs out of attempts. Returns the last error.
pub async fn retry_with_backoff<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    mut operation: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                if !is_retryable(&err) {
                    tracing::warn!(attempt, error = %err, "Error is not retryable, giving up");
                    return Err(err);
                }
                if attempt >= max_attempts {
                    tracing::error!(attempt, error = %err, "Operation failed after max attempts");
                    return Err(err);
                }

                let delay = policy.delay_for_retry(attempt - 1);
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Operation failed, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_delay_grows_and_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay_ms: 100,
            max_delay_ms: 500,
            multiplier: 2.0,
        };

        assert_eq!(policy.delay_for_retry(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_retry(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_retry(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_retry(3), Duration::from_millis(500));
    }

    #[test]
    fn test_worst_case_counts_every_attempt_and_backoff() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 1_000,
            multiplier: 2.0,
        };

        // 3 x 1s of calls plus 100ms and 200ms of backoff.
        assert_eq!(policy.worst_case(Duration::from_secs(1)), Duration::from_millis(3_300));
        assert_eq!(RetryPolicy::no_retry().worst_case(Duration::from_secs(1)), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::fixed(3, Duration::from_millis(1));

        let counter = calls.clone();
        let result = retry_with_backoff(
            &policy,
            move |_| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("503 Service Unavailable".to_string())
                    } else {
                        Ok(7)
                    }
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_stops_at_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::fixed(2, Duration::from_millis(1));

        let counter = calls.clone();
        let result: Result<(), String> = retry_with_backoff(
            &policy,
            move |attempt| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Err(format!("attempt {} failed", attempt)) }
            },
            |_| true,
        )
        .await;

        assert_eq!(result, Err("attempt 2 failed".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_fast() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), String> = retry_with_backoff(
            &RetryPolicy::default(),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err("400 Bad Request".to_string()) }
            },
            |err| !err.starts_with("400"),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
