//! Bounded retry with a fixed delay.
//!
//! Provider calls that fail only because the provider has not converged yet
//! (a freshly created role that is not assumable, a function still replicated
//! to the edge) are retried while the error code is one of the listed ones.
//! Any other error ends the loop immediately.

use std::future::Future;

use cdn_proxy_common::config::RetryPolicy;
use cdn_proxy_common::error::{CdnProxyError, ProviderError};
use tracing::debug;

#[derive(Debug)]
pub enum RetryError {
    /// The call failed with a code that is not retryable.
    Fatal(ProviderError),
    /// Every attempt failed with a retryable code.
    Exhausted { attempts: u32, last: ProviderError },
}

impl RetryError {
    /// The provider error that ended the loop.
    pub fn last(&self) -> &ProviderError {
        match self {
            RetryError::Fatal(err) | RetryError::Exhausted { last: err, .. } => err,
        }
    }

    pub fn into_error(self, resource: impl Into<String>) -> CdnProxyError {
        match self {
            RetryError::Fatal(source) => CdnProxyError::provider(resource, source),
            RetryError::Exhausted { attempts, last } => CdnProxyError::RetriesExhausted {
                resource: resource.into(),
                attempts,
                source: last,
            },
        }
    }
}

/// Runs `op` until it succeeds, fails with a code outside `retryable`, or
/// `policy.attempts` calls have been made. `on_attempt` sees the 1-based
/// attempt number before each call.
pub async fn retry_on<T, F, Fut>(
    policy: RetryPolicy,
    retryable: &[&str],
    mut on_attempt: impl FnMut(u32),
    mut op: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let attempts: u32 = policy.attempts.max(1);
    let mut attempt: u32 = 1;

    loop {
        on_attempt(attempt);

        let err: ProviderError = match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_any(retryable) => err,
            Err(err) => return Err(RetryError::Fatal(err)),
        };

        if attempt >= attempts {
            return Err(RetryError::Exhausted { attempts, last: err });
        }

        debug!(attempt, code = ?err.code, delay = ?policy.delay, "provider not ready, retrying");
        tokio::time::sleep(policy.delay).await;
        attempt += 1;
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;

    const BUSY: &str = "Busy";

    #[tokio::test]
    async fn retries_until_success() {
        let calls = &AtomicU32::new(0);
        let mut seen: Vec<u32> = Vec::new();

        let result = retry_on(
            RetryPolicy::immediate(5),
            &[BUSY],
            |attempt| seen.push(attempt),
            || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ProviderError::coded("Op", BUSY, "not yet"))
                } else {
                    Ok("done")
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn other_codes_are_fatal_immediately() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = retry_on(
            RetryPolicy::immediate(5),
            &[BUSY],
            |_| {},
            || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::coded("Op", "AccessDenied", "no"))
            },
        )
        .await;

        assert!(matches!(result, Err(RetryError::Fatal(ref e)) if e.is("AccessDenied")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ceiling_is_fatal() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = retry_on(
            RetryPolicy::immediate(3),
            &[BUSY],
            |_| {},
            || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::coded("Op", BUSY, "never"))
            },
        )
        .await;

        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 3, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_the_fixed_delay_between_attempts() {
        let start = tokio::time::Instant::now();
        let _: Result<(), _> = retry_on(
            RetryPolicy::new(3, Duration::from_secs(10)),
            &[BUSY],
            |_| {},
            || async { Err(ProviderError::coded("Op", BUSY, "never")) },
        )
        .await;
        assert_eq!(start.elapsed(), Duration::from_secs(20));
    }
}
