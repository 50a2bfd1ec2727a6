//! Bounded retry with server-directed waits.
//!
//! [`retry_with_backoff`] is parameterized by the attempt budget, a predicate
//! deciding which errors are retryable, and a source for the wait the server
//! requested. Waits above the policy ceiling fail immediately without
//! sleeping; an absent or non-positive wait falls back to `2^retry` seconds.
//! Every wait races the cancellation token.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Retry budget and wait ceiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Longest server-requested wait we are willing to honour.
    pub max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_wait: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `retry` (1-based).
    ///
    /// Returns `Err(requested)` when the server asked for more than the ceiling.
    pub fn wait_for(&self, retry: u32, requested: Option<Duration>) -> Result<Duration, Duration> {
        match requested {
            Some(w) if w > self.max_wait => Err(w),
            Some(w) if !w.is_zero() => Ok(w),
            _ => Ok(Duration::from_secs(2u64.saturating_pow(retry))),
        }
    }
}

/// Why a retried operation gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The operation failed with an error the predicate rejected.
    Failed(E),
    /// The server asked for a wait longer than the ceiling.
    WaitTooLong { requested: Duration, last: E },
    /// Retries ran out.
    Exhausted { attempts: u32, last: E },
    Cancelled,
}

/// Run `op` until it succeeds, fails non-retryably, or the budget runs out.
pub async fn retry_with_backoff<T, E, F, Fut, P, W>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
    is_retryable: P,
    requested_wait: W,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    W: Fn(&E) -> Option<Duration>,
    E: std::fmt::Display,
{
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }
        attempt += 1;

        let err = match op().await {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };

        if !is_retryable(&err) {
            return Err(RetryError::Failed(err));
        }
        if attempt > policy.max_retries {
            return Err(RetryError::Exhausted { attempts: attempt, last: err });
        }

        let wait = match policy.wait_for(attempt, requested_wait(&err)) {
            Ok(w) => w,
            Err(requested) => return Err(RetryError::WaitTooLong { requested, last: err }),
        };

        warn!(
            attempt,
            max_retries = policy.max_retries,
            wait_ms = wait.as_millis() as u64,
            error = %err,
            "retryable failure, backing off"
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            _ = tokio::time::sleep(wait) => {}
        }
    }
}
