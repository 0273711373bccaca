//! Timeout, retry and cancellation around generator calls.

use super::GeneratorError;
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How external calls are bounded and retried.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_ms: u64,
    /// Per-attempt timeout.
    pub timeout_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            backoff_multiplier: 2.0,
            max_backoff_ms: 8000,
            timeout_secs: 60,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt + 1` (zero-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = base.min(self.max_backoff_ms as f64).max(0.0) as u64;
        Duration::from_millis(capped)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Run `operation` under this policy.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Cancelled`] if `cancel` fires while waiting,
    /// otherwise [`PipelineError::ExternalDependency`] once a fatal error
    /// occurs or the attempts run out.
    pub async fn run<F, Fut, T>(&self, cancel: &CancellationToken, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<T, GeneratorError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut last_err = GeneratorError::Timeout;

        for attempt in 0..max_attempts {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let outcome = tokio::select! {
                () = cancel.cancelled() => return Err(PipelineError::Cancelled),
                res = tokio::time::timeout(self.timeout(), operation()) => {
                    res.unwrap_or(Err(GeneratorError::Timeout))
                }
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => {
                    return Err(PipelineError::ExternalDependency {
                        attempts: attempt + 1,
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    if attempt + 1 < max_attempts {
                        let delay = self.backoff(attempt);
                        tracing::warn!(
                            attempt = attempt + 1,
                            max = max_attempts,
                            backoff_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            error = %e,
                            "Retrying after transient error"
                        );
                        tokio::select! {
                            () = cancel.cancelled() => return Err(PipelineError::Cancelled),
                            () = tokio::time::sleep(delay) => {}
                        }
                    }
                    last_err = e;
                }
            }
        }

        Err(PipelineError::ExternalDependency {
            attempts: max_attempts,
            message: last_err.to_string(),
        })
    }
}
