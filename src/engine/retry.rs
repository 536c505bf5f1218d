//! Exponential-backoff retry executor
//!
//! Wraps any fallible async operation. Only recoverable errors are retried
//! (see [`PipelineError::is_recoverable`]); everything else is returned from the
//! first failing attempt untouched. When the budget runs out the caller gets a
//! single `RetriesExhausted` error carrying the context, the attempt count and
//! the last underlying error.

use log::{debug, warn};
use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::{PipelineError, PipelineResult};

/// Retry schedule: `max_attempts` calls, `base * multiplier^(n-1)` before retry n
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    backoff_multiplier: f64,
}

impl RetryPolicy {
    /// # Errors
    /// Returns a validation error for zero attempts or a multiplier below 1.
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        backoff_multiplier: f64,
    ) -> PipelineResult<Self> {
        RetryConfig {
            max_attempts,
            base_delay_ms: 0,
            backoff_multiplier,
        }
        .validate()?;

        Ok(Self {
            max_attempts,
            base_delay,
            backoff_multiplier,
        })
    }

    /// Build a policy from a validated config
    pub fn from_config(config: &RetryConfig) -> PipelineResult<Self> {
        Self::new(config.max_attempts, config.base_delay(), config.backoff_multiplier)
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay slept before retry number `retry` (1-based)
    #[must_use]
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let nanos = self.base_delay.as_nanos() as f64 * self.backoff_multiplier.powi(exponent);
        if !nanos.is_finite() || nanos >= u64::MAX as f64 {
            return Duration::MAX;
        }
        Duration::from_nanos(nanos.round() as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        let config = RetryConfig::default();
        Self {
            max_attempts: config.max_attempts,
            base_delay: config.base_delay(),
            backoff_multiplier: config.backoff_multiplier,
        }
    }
}

/// Run `operation` under `policy`
///
/// `operation` receives the 1-based attempt number. `context` names the work
/// (step, URL) and ends up in the exhaustion error.
pub async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    context: &str,
    operation: F,
) -> PipelineResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = PipelineResult<T>>,
{
    with_retry_notify(policy, context, operation, |_, _| {}).await
}

/// Like [`with_retry`], calling `on_retry(next_attempt, &error)` before each
/// backoff sleep
pub async fn with_retry_notify<F, Fut, T, N>(
    policy: &RetryPolicy,
    context: &str,
    mut operation: F,
    mut on_retry: N,
) -> PipelineResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = PipelineResult<T>>,
    N: FnMut(u32, &PipelineError),
{
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{context} succeeded on attempt {attempt}");
                }
                return Ok(value);
            }
            Err(error) if !error.is_recoverable() => {
                debug!("{context} failed with non-recoverable error: {error}");
                return Err(error);
            }
            Err(error) if attempt >= policy.max_attempts => {
                warn!(
                    "{context} failed after {attempt} attempts, giving up: {error}"
                );
                return Err(PipelineError::RetriesExhausted {
                    context: context.to_string(),
                    attempts: attempt,
                    last_error: Box::new(error),
                });
            }
            Err(error) => {
                let delay = policy.delay_for_retry(attempt);
                warn!(
                    "{context} attempt {attempt}/{} failed, retrying in {delay:?}: {error}",
                    policy.max_attempts
                );
                on_retry(attempt + 1, &error);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn network_error() -> PipelineError {
        PipelineError::operational(FailureKind::Network, "connection reset")
    }

    #[test]
    fn test_delay_schedule_is_pure_exponential() {
        let policy = RetryPolicy::new(4, Duration::from_millis(1000), 1.5).expect("valid");
        assert_eq!(policy.delay_for_retry(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_retry(2), Duration::from_millis(1500));
        assert_eq!(policy.delay_for_retry(3), Duration::from_millis(2250));
    }

    #[test]
    fn test_invalid_policy_rejected() {
        assert!(RetryPolicy::new(0, Duration::from_millis(10), 2.0).is_err());
        assert!(RetryPolicy::new(3, Duration::from_millis(10), 0.5).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fails_twice_then_succeeds() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100), 2.0).expect("valid");
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();
        let mut sleeps = Vec::new();
        let mut last = started;

        let result = with_retry(&policy, "fetch chapter", |attempt| {
            let calls = Arc::clone(&calls);
            let now = Instant::now();
            sleeps.push(now - last);
            last = now;
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                if attempt < 3 { Err(network_error()) } else { Ok("chapter") }
            }
        })
        .await;

        assert_eq!(result.expect("third attempt succeeds"), "chapter");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            sleeps,
            vec![
                Duration::ZERO,
                Duration::from_millis(100),
                Duration::from_millis(200)
            ]
        );
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_recoverable_invoked_once() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100), 2.0).expect("valid");
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result: PipelineResult<()> = with_retry(&policy, "translate", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(PipelineError::fatal("invalid api key")) }
        })
        .await;

        assert!(matches!(result, Err(PipelineError::Fatal(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_wraps_last_error_with_context() {
        let policy = RetryPolicy::new(2, Duration::from_millis(10), 1.0).expect("valid");
        let mut retries_seen = Vec::new();

        let result: PipelineResult<()> = with_retry_notify(
            &policy,
            "fetch https://example.com/7",
            |_| async { Err(network_error()) },
            |next, _| retries_seen.push(next),
        )
        .await;

        match result {
            Err(PipelineError::RetriesExhausted {
                context,
                attempts,
                last_error,
            }) => {
                assert_eq!(context, "fetch https://example.com/7");
                assert_eq!(attempts, 2);
                assert!(matches!(*last_error, PipelineError::Operational { .. }));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
        assert_eq!(retries_seen, vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nested_retry_spends_inner_budget_once() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10), 1.0).expect("valid");
        let calls = AtomicU32::new(0);
        let (inner_policy, counter) = (&policy, &calls);

        let result: PipelineResult<()> = with_retry(&policy, "chapter step", move |_| {
            with_retry(inner_policy, "fetch u1", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(network_error()) }
            })
        })
        .await;

        let err = result.expect_err("every attempt fails");
        assert!(matches!(err, PipelineError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
