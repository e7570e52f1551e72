//! Exponential backoff for post-deployment steps that are safe to repeat.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Upper bound on a single backoff delay.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_millis(initial_delay_ms),
        }
    }
}

/// Run `op` until it succeeds, `is_retryable` rejects its error, or the
/// attempts run out. The delay doubles after each failure, capped at 60s.
pub async fn with_retries<T, F, Fut>(
    policy: RetryPolicy,
    what: &str,
    is_retryable: impl Fn(&anyhow::Error) -> bool,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = policy.initial_delay;
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_attempts && is_retryable(&e) => {
                warn!(
                    attempt,
                    delay = ?delay,
                    error = %format!("{e:#}"),
                    "{what} failed, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2).min(MAX_RETRY_DELAY);
                attempt += 1;
            }
            Err(e) => return Err(e.context(format!("{what} failed after {attempt} attempt(s)"))),
        }
    }
}

/// Reverts are deterministic; repeating them only burns gas.
pub fn is_transient(err: &anyhow::Error) -> bool {
    crate::chain::revert_of(err).is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max: u32) -> RetryPolicy {
        RetryPolicy::new(max, 1)
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = &AtomicU32::new(0);
        let value = with_retries(fast(5), "op", |_| true, move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                anyhow::bail!("connection reset");
            }
            Ok(7)
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = &AtomicU32::new(0);
        let err = with_retries(fast(3), "register consumer", |_| true, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(anyhow::anyhow!("timeout"))
        })
        .await
        .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(format!("{err:#}").contains("register consumer failed after 3 attempt(s)"));
    }

    #[tokio::test]
    async fn non_retryable_errors_stop_immediately() {
        let calls = &AtomicU32::new(0);
        let result = with_retries(fast(5), "op", |_| false, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(anyhow::anyhow!("reverted"))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reverts_are_not_transient() {
        let revert: anyhow::Error =
            crate::error::DeployError::Reverted(crate::revert::RaffleRevert::NotOpen).into();
        assert!(!is_transient(&revert));
        assert!(is_transient(&anyhow::anyhow!("connection refused")));
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        assert_eq!(RetryPolicy::new(0, 10).max_attempts, 1);
    }
}
