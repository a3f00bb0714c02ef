//! Retry utilities with exponential backoff and jitter.
//!
//! [`retry_with_backoff`] retries an async operation while a caller-supplied
//! predicate classifies the error as retriable, up to a bounded number of
//! attempts. Every attempt and every sleep races the caller's
//! [`CancellationToken`], so a cancelled reconcile stops immediately instead
//! of burning through its retry budget.
//!
//! # Example
//!
//! ```ignore
//! use resource_store::retry::{retry_with_backoff, RetryConfig};
//!
//! let host = retry_with_backoff(
//!     &RetryConfig::default(),
//!     &cancel,
//!     "get BareMetalHost",
//!     StoreError::is_transient,
//!     || store.get("hosts", "bmh-1"),
//! ).await?;
//! ```

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Returned when the caller's cancellation token fires mid-retry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Backoff configuration for operations that may fail transiently.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts (0 = unbounded)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for a single delay
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each failure
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    /// Five attempts starting at 10ms, the conflict-retry budget used for
    /// every conditional write
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// No sleeping between attempts; for tests
    pub fn immediate(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }
}

/// Retry budget plus the cancellation signal bounding it
#[derive(Clone, Debug, Default)]
pub struct RetryContext {
    pub config: RetryConfig,
    pub cancel: CancellationToken,
}

impl RetryContext {
    pub fn new(config: RetryConfig, cancel: CancellationToken) -> Self {
        Self { config, cancel }
    }
}

/// Execute an async operation with exponential backoff and jitter.
///
/// Stops on success, on the first error `is_retriable` rejects, once
/// `max_attempts` is exhausted (returning the last error), or when `cancel`
/// fires (returning [`Cancelled`] converted into `E`).
pub async fn retry_with_backoff<F, Fut, T, E, P>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    operation_name: &str,
    is_retriable: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display + From<Cancelled>,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        if cancel.is_cancelled() {
            return Err(Cancelled.into());
        }
        attempt += 1;

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Cancelled.into()),
            result = operation() => result,
        };

        let e = match result {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !is_retriable(&e) {
            return Err(e);
        }

        if config.max_attempts > 0 && attempt >= config.max_attempts {
            error!(
                operation = %operation_name,
                attempt = attempt,
                error = %e,
                "Operation failed after max retries"
            );
            return Err(e);
        }

        // Jitter: 0.5x to 1.5x of the delay
        let jitter = rand::rng().random_range(0.5..1.5);
        let jittered_delay = Duration::from_secs_f64(delay.as_secs_f64() * jitter);

        warn!(
            operation = %operation_name,
            attempt = attempt,
            error = %e,
            delay_ms = jittered_delay.as_millis(),
            "Operation failed, retrying"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Cancelled.into()),
            () = tokio::time::sleep(jittered_delay) => {}
        }

        delay = Duration::from_secs_f64(
            (delay.as_secs_f64() * config.backoff_multiplier).min(config.max_delay.as_secs_f64()),
        );
    }
}
