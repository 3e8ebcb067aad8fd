//! Confirmation poller.
//!
//! Downstream consumers apply bus submissions asynchronously, so phase
//! completion is observed by re-checking a store predicate on a fixed
//! interval with a bounded attempt budget. The poller is a small state
//! machine: attempt counter, fixed interval, terminal predicate.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::AppError;

/// Bounded fixed-interval poller.
#[derive(Debug, Clone)]
pub struct Poller {
    interval: Duration,
    max_attempts: u32,
    cancel: CancellationToken,
}

impl Poller {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
            cancel: CancellationToken::new(),
        }
    }

    /// Attach a cancellation token; a cancelled poller stops between
    /// attempts and reports exhaustion.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Re-evaluate `predicate` until it returns true or the attempt budget
    /// is spent.
    ///
    /// Returns the attempt number that succeeded. Predicate errors count
    /// as failed attempts rather than aborting the wait; only exhaustion
    /// is an error, reported as [`AppError::RetryExhausted`].
    pub async fn await_completion<F, Fut>(
        &self,
        operation: &str,
        mut predicate: F,
    ) -> Result<u32, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, AppError>>,
    {
        for attempt in 1..=self.max_attempts {
            match predicate().await {
                Ok(true) => {
                    debug!(operation, attempt, "confirmation predicate satisfied");
                    return Ok(attempt);
                }
                Ok(false) => {
                    debug!(operation, attempt, "confirmation predicate not yet satisfied");
                }
                Err(e) => {
                    warn!(operation, attempt, error = %e, "confirmation check failed");
                }
            }

            if attempt < self.max_attempts {
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        warn!(operation, attempt, "confirmation wait cancelled");
                        break;
                    }
                    _ = tokio::time::sleep(self.interval) => {}
                }
            }
        }

        Err(AppError::RetryExhausted {
            operation: operation.to_string(),
            attempts: self.max_attempts,
        })
    }
}
