use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};

use super::{DataError, DataResult};

/// Longest pause between two attempts, whatever a server asks for
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Pause before the next attempt: the jittered backoff, stretched to honour
/// a Retry-After hint but never beyond `MAX_RETRY_DELAY`.
fn next_delay(error: &DataError, backoff: Duration) -> Duration {
    match error {
        DataError::RateLimit { retry_after } => backoff
            .max(Duration::from_secs(*retry_after))
            .min(MAX_RETRY_DELAY),
        _ => backoff,
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// `max_attempts` is exhausted. Sleeps only when another attempt follows.
pub async fn retry_with_backoff<F, Fut, T>(operation: F, max_attempts: usize) -> DataResult<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = DataResult<T>>,
{
    // the first call is not part of the strategy
    let retries = max_attempts.saturating_sub(1);
    let mut delays = ExponentialBackoff::from_millis(100)
        .max_delay(MAX_RETRY_DELAY)
        .map(jitter)
        .take(retries);

    let mut attempt = 1;
    loop {
        let err = match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        if !err.is_retryable() {
            tracing::error!("Non-retryable error: {}", err);
            return Err(err);
        }

        let Some(backoff) = delays.next() else {
            tracing::warn!("Giving up after {} attempts: {}", attempt, err);
            return Err(err);
        };

        let delay = next_delay(&err, backoff);
        tracing::warn!(
            "Retryable error on attempt {}: {}, retrying in {}ms",
            attempt,
            err,
            delay.as_millis()
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
