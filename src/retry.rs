//! # Retry With Exponential Backoff
//!
//! Calls to the identity provider can fail transiently (restarts, timeouts,
//! rate limiting). This module wraps an async action in a bounded retry loop.
//!
//! ## Schedule
//! - Attempt 1 runs immediately
//! - After attempt `k` fails, wait `initial_delay * 2^(k-1)` before attempt `k+1`
//! - After `max_attempts` failures, return the last error and the attempt count
//!
//! With 3 attempts and a 1 second base delay the waits are 1s then 2s, so a
//! call that never succeeds blocks its caller for about 3 seconds.
//!
//! ## Cancellation
//! The wait only suspends the calling task. If the cancellation token fires
//! while waiting, the loop stops and returns [`RetryError::Cancelled`].

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Attempt budget and base delay for one retried call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Wait after the first failed attempt; doubled for every later failure
    pub initial_delay: Duration,
}

impl RetryPolicy {
    /// A budget of zero attempts is treated as one attempt.
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
        }
    }

    /// Wait that follows failed attempt number `attempt` (1-based)
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay.saturating_mul(factor)
    }
}

/// Failure of a retried action
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every attempt failed; `last` is the error of the final attempt
    #[error("failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: E,
    },

    /// The cancellation token fired while waiting between attempts
    #[error("cancelled after {attempts} attempts: {last}")]
    Cancelled {
        attempts: u32,
        #[source]
        last: E,
    },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } | RetryError::Cancelled { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn into_last(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } | RetryError::Cancelled { last, .. } => last,
        }
    }
}

/// Run `action` until it succeeds or the policy's attempt budget is spent
///
/// `operation` only labels the log lines.
pub async fn execute<T, E, F, Fut>(
    policy: RetryPolicy,
    cancel: &CancellationToken,
    operation: &str,
    mut action: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match action().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(operation, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if attempt >= max_attempts => {
                tracing::error!(operation, attempts = attempt, error = %err, "Giving up");
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: err,
                });
            }
            Err(err) => {
                let delay = policy.backoff_after(attempt);
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Attempt failed, retrying"
                );

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::warn!(operation, attempt, "Retry cancelled");
                        return Err(RetryError::Cancelled { attempts: attempt, last: err });
                    }
                    _ = tokio::time::sleep(delay) => {}
                }

                attempt += 1;
            }
        }
    }
}
