//! Retry policy
//!
//! One policy type serves both the per-tool-call retry loop and the optional
//! outer retry around a whole model exchange.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::ErrorKind;

/// Failures the retry loop can classify
pub trait Retryable {
    /// Taxonomy kind of this failure
    fn error_kind(&self) -> ErrorKind;

    /// `true` when this failure must end the loop whatever the policy says
    fn is_final(&self) -> bool {
        false
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first (at least 1)
    pub max_attempts: u32,

    /// Delay before the first retry
    pub delay: Duration,

    /// Growth factor applied to the delay after each retry (1.0 = constant)
    pub backoff_multiplier: f64,

    /// Upper bound for the delay
    pub max_delay: Duration,

    /// Kinds that may be retried; `None` uses [`ErrorKind::is_retryable`]
    pub retryable: Option<HashSet<ErrorKind>>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        let defaults = agent_utils::Defaults::default();
        Self::new(defaults.exchange_attempts, defaults.retry_delay())
    }
}

impl RetryPolicy {
    /// Constant-delay policy using the taxonomy's retryable set
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            backoff_multiplier: 1.0,
            max_delay: delay,
            retryable: None,
        }
    }

    /// Create a policy with no retries
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Exponential backoff capped at `max_delay`
    pub fn with_backoff(mut self, multiplier: f64, max_delay: Duration) -> Self {
        self.backoff_multiplier = multiplier;
        self.max_delay = max_delay.max(self.delay);
        self
    }

    /// Replace the default retryable set
    pub fn with_retryable(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.retryable = Some(kinds.into_iter().collect());
        self
    }

    /// Whether a failure of `kind` may be attempted again under this policy
    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        match &self.retryable {
            Some(kinds) => kinds.contains(&kind),
            None => kind.is_retryable(),
        }
    }

    /// Whether a failure of `kind` after `attempt` attempts should be retried
    pub fn should_retry(&self, kind: ErrorKind, attempt: u32) -> bool {
        attempt < self.max_attempts && self.is_retryable(kind)
    }

    /// Delay to wait after the `attempt`-th failed attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.delay.is_zero() {
            return Duration::ZERO;
        }

        let factor = self
            .backoff_multiplier
            .max(1.0)
            .powi(attempt.saturating_sub(1) as i32);
        let delay = self.delay.mul_f64(factor);

        if delay > self.max_delay {
            self.max_delay
        } else {
            delay
        }
    }

    /// Execute an async operation with retry logic
    ///
    /// Every attempt re-invokes `operation` from scratch. Returns the first
    /// success, or the last failure once attempts are exhausted or a failure
    /// is not retryable.
    pub async fn execute<F, Fut, T, E>(
        &self,
        operation_name: &str,
        mut operation: F,
    ) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!(
                operation = operation_name,
                attempt,
                max_attempts = self.max_attempts,
                "Attempt started"
            );

            let error = match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation = operation_name, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            let kind = error.error_kind();
            if error.is_final() || !self.should_retry(kind, attempt) {
                if attempt > 1 || self.is_retryable(kind) {
                    warn!(
                        operation = operation_name,
                        attempts = attempt,
                        kind = %kind,
                        error = %error,
                        "Giving up"
                    );
                }
                return Err(error);
            }

            let delay = self.delay_after(attempt);
            warn!(
                operation = operation_name,
                attempt,
                max_attempts = self.max_attempts,
                kind = %kind,
                error = %error,
                delay_ms = delay.as_millis() as u64,
                "Attempt failed, retrying"
            );
            if !delay.is_zero() {
                sleep(delay).await;
            }
        }
    }
}
