//! Retry logic with exponential backoff
//!
//! Wraps any fallible async operation. The backoff sequence is
//! `min(max_delay, initial_delay * multiplier^(n-1))` for the n-th retry.
//!
//! Jitter is one-sided: it only ever adds up to 30% of the computed delay and
//! never subtracts. The effective mean delay is therefore about 15% above the
//! nominal backoff, and a jittered delay may exceed `max_delay` by up to 30%.

use std::fmt;
use std::time::Duration;
use backoff::{backoff::Backoff, ExponentialBackoff, ExponentialBackoffBuilder};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::http::cancel::Cancellation;
use crate::http::error::HttpError;

/// Upper bound of the additive jitter, as a fraction of the computed delay
pub const JITTER_RATIO: f64 = 0.3;

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of attempts, the first one included (at least one is made)
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds
    pub initial_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Maximum delay between retries, in milliseconds (before jitter)
    pub max_delay_ms: u64,
    /// Whether to add one-sided jitter to prevent thundering herd
    pub use_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1_000,
            backoff_multiplier: 2.0,
            max_delay_ms: 30_000,
            use_jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy with custom attempt limit
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Set the initial delay
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the maximum delay
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the backoff multiplier
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enable or disable jitter
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.use_jitter = jitter;
        self
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Create a deterministic exponential backoff; jitter is applied separately
    pub fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_delay())
            .with_max_interval(self.max_delay())
            .with_multiplier(self.backoff_multiplier)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build()
    }

    /// Next delay from the backoff sequence, capped and optionally jittered
    fn next_delay(&self, backoff: &mut ExponentialBackoff) -> Duration {
        let base = backoff
            .next_backoff()
            .unwrap_or_else(|| self.max_delay())
            .min(self.max_delay());

        if self.use_jitter {
            self.apply_jitter(base)
        } else {
            base
        }
    }

    /// Add up to [`JITTER_RATIO`] of `delay`, never subtracting
    pub fn apply_jitter(&self, delay: Duration) -> Duration {
        let factor = rand::thread_rng().gen_range(0.0..=JITTER_RATIO);
        delay + delay.mul_f64(factor)
    }

    /// Validate the policy
    pub fn validate(&self) -> Result<(), String> {
        if self.max_retries == 0 {
            return Err("max_retries must allow at least one attempt".to_string());
        }
        if self.backoff_multiplier < 1.0 || !self.backoff_multiplier.is_finite() {
            return Err("backoff_multiplier must be a finite value >= 1.0".to_string());
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err("max_delay_ms cannot be smaller than initial_delay_ms".to_string());
        }
        Ok(())
    }
}

/// Terminal failure of a retried operation
#[derive(Debug, Clone, PartialEq)]
pub enum RetryError<E> {
    /// The operation failed with an error the predicate rejected
    Permanent { error: E, attempts: u32 },
    /// Every allowed attempt failed with a retryable error
    Exhausted { last: E, attempts: u32 },
    /// Cancellation was requested before the operation finished
    Cancelled { attempts: u32 },
}

impl<E> RetryError<E> {
    /// Number of times the operation was invoked
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Permanent { attempts, .. }
            | RetryError::Exhausted { attempts, .. }
            | RetryError::Cancelled { attempts } => *attempts,
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Permanent { error, .. } => write!(f, "{}", error),
            RetryError::Exhausted { last, attempts } => {
                write!(f, "gave up after {} attempt(s): {}", attempts, last)
            }
            RetryError::Cancelled { .. } => write!(f, "cancelled"),
        }
    }
}

impl From<RetryError<HttpError>> for crate::Error {
    fn from(error: RetryError<HttpError>) -> Self {
        match error {
            RetryError::Permanent { error, .. } => crate::Error::Permanent(error),
            RetryError::Exhausted { last, attempts } => {
                crate::Error::ExhaustedRetries { attempts, last }
            }
            RetryError::Cancelled { .. } => crate::Error::Cancelled,
        }
    }
}

/// Executes operations under a [`RetryPolicy`]
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    /// Create a new executor with the given policy
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds, fails permanently, runs out of
    /// attempts, or `cancel` fires.
    ///
    /// Cancellation aborts both an in-flight attempt and a pending backoff
    /// wait; no further attempt is made afterwards.
    pub async fn execute<F, Fut, T, E, P>(
        &self,
        mut operation: F,
        is_retryable: P,
        cancel: &Cancellation,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: fmt::Display,
    {
        let max_attempts = self.policy.max_retries.max(1);
        let mut backoff = self.policy.create_backoff();
        let mut attempts = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled { attempts });
            }
            attempts += 1;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled { attempts }),
                result = operation() => result,
            };

            let error = match result {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !is_retryable(&error) {
                debug!(attempt = attempts, error = %error, "Permanent failure, not retrying");
                return Err(RetryError::Permanent { error, attempts });
            }

            if attempts >= max_attempts {
                warn!(attempts, error = %error, "Retries exhausted");
                return Err(RetryError::Exhausted { last: error, attempts });
            }

            let delay = self.policy.next_delay(&mut backoff);
            warn!(
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Request failed, retrying"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled { attempts }),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

/// Execute an HTTP operation with the default transient-error classifier
pub async fn execute_with_retry<F, Fut, T>(
    request_fn: F,
    policy: RetryPolicy,
    cancel: &Cancellation,
) -> crate::Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, HttpError>>,
{
    RetryExecutor::new(policy)
        .execute(request_fn, HttpError::is_transient, cancel)
        .await
        .map_err(crate::Error::from)
}
