//! Exponential backoff for transient fetch and store failures.
//!
//! Only errors reporting [`IngestError::is_retryable`] are retried. Embedding
//! failures are never retried; they abort the ingestion.

use crate::config::RetryConfig;
use crate::error::IngestError;
use crate::types::IngestStage;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Retry schedule: `initial * 2^(attempt-1)`, capped at `max_backoff`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: config.initial_backoff(),
            max_backoff: config.max_backoff(),
        }
    }

    /// A policy that runs the operation exactly once
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32 << (attempt - 1).min(16);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Run `operation` until it succeeds, fails permanently, or retries run out.
    ///
    /// Cancellation is observed before each attempt and while sleeping between
    /// attempts; it surfaces as [`IngestError::Cancelled`] for `stage`.
    pub async fn run<T, F, Fut>(
        &self,
        what: &str,
        stage: IngestStage,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, IngestError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, IngestError>>,
    {
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(IngestError::Cancelled { stage });
            }

            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        what,
                        attempt,
                        self.max_retries + 1,
                        delay,
                        e
                    );

                    tokio::select! {
                        _ = cancel.cancelled() => {
                            return Err(IngestError::Cancelled { stage });
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    if attempt > 0 {
                        tracing::error!("{} failed after {} attempts: {}", what, attempt + 1, e);
                    }
                    return Err(e);
                }
            }
        }
    }
}
