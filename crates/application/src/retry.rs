use std::future::Future;

use rolegate_core::{AppError, AppResult};
use tracing::warn;

use crate::RetryPolicy;

/// Runs an external call with a per-attempt timeout and bounded exponential backoff.
///
/// Only [`AppError::Transient`] failures and timeouts are retried. When the
/// attempts are exhausted the last failure is surfaced as
/// [`AppError::DependencyUnavailable`].
pub async fn call_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut backoff = policy.initial_backoff;
    let mut attempt = 0_u32;

    loop {
        attempt = attempt.saturating_add(1);
        let outcome = match tokio::time::timeout(policy.call_timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Transient(format!(
                "{operation} timed out after {}ms",
                policy.call_timeout.as_millis()
            ))),
        };

        match outcome {
            Err(error) if error.is_transient() => {
                if attempt >= max_attempts {
                    return Err(AppError::DependencyUnavailable(format!(
                        "{operation} failed after {attempt} attempts: {error}"
                    )));
                }

                warn!(
                    operation = operation,
                    attempt = attempt,
                    backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                    error = %error,
                    "retrying transient dependency failure"
                );
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2).min(policy.max_backoff);
            }
            other => return other,
        }
    }
}
