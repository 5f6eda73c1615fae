use crate::constants::resilience as defaults;
use crate::error::Result;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt; the operation runs at most
    /// `max_attempts + 1` times.
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: crate::constants::scheduling::DEFAULT_MAX_RETRIES,
            backoff_base: Duration::from_millis(defaults::DEFAULT_BACKOFF_BASE_MS),
            backoff_cap: Duration::from_millis(defaults::DEFAULT_BACKOFF_CAP_MS),
        }
    }
}

/// Equal-Jitter backoff: half the exponential window fixed, half random.
/// The fixed half keeps the minimum wait strictly positive, so bursts of
/// failures can never degenerate into a tight loop.
pub fn equal_jitter(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exp = policy
        .backoff_base
        .saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
        .min(policy.backoff_cap);
    let half = (exp / 2).max(Duration::from_millis(1));
    let jitter_ms = rand::thread_rng().gen_range(0..=half.as_millis() as u64);
    half + Duration::from_millis(jitter_ms)
}

/// Run `f` until it succeeds, a fatal error surfaces, or the attempt budget
/// is spent. Classification comes from `ConclaveError::is_transient`; fatal
/// errors abort immediately with the original error.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    op_name: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match f(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt <= policy.max_attempts => {
                let delay = equal_jitter(policy, attempt);
                tracing::debug!(
                    op = op_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient failure, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConclaveError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff_base: Duration::from_millis(2),
            backoff_cap: Duration::from_millis(10),
        }
    }

    #[test]
    fn jitter_is_never_zero() {
        let policy = quick_policy(3);
        for attempt in 1..=5 {
            for _ in 0..50 {
                assert!(equal_jitter(&policy, attempt) > Duration::ZERO);
            }
        }
    }

    #[test]
    fn jitter_respects_cap() {
        let policy = RetryPolicy {
            max_attempts: 8,
            backoff_base: Duration::from_millis(100),
            backoff_cap: Duration::from_millis(400),
        };
        for _ in 0..50 {
            assert!(equal_jitter(&policy, 10) <= Duration::from_millis(400));
        }
    }

    #[tokio::test]
    async fn stops_after_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_with_backoff(&quick_policy(2), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ConclaveError::EmptyResponse) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_errors_abort_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_with_backoff(&quick_policy(5), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ConclaveError::Auth("bad key".to_string())) }
        })
        .await;
        assert!(matches!(result, Err(ConclaveError::Auth(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn success_returns_early() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(&quick_policy(5), "test", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(ConclaveError::IdleTimeout)
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
