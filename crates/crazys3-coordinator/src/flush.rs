//! What to do when a batch submit fails.

use std::time::Duration;

use crazys3_transport::{is_unsent, RetryConfig, RetryExecutor, TransportError};
use crazys3_worker::{ExecutionRequest, JobKind};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::handle::WorkerHandle;

/// Failure policy for batch submits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FlushPolicy {
    /// Try once; a failed batch is logged and dropped.
    AtMostOnce,
    /// Retry with exponential backoff, then drop. Only failures where the
    /// batch never reached the worker are retried, since a worker may have
    /// enqueued a batch whose reply was lost.
    Retry {
        /// Retries after the first attempt.
        max_retries: u32,
        /// First backoff in milliseconds.
        initial_backoff_ms: u64,
        /// Backoff cap in milliseconds.
        max_backoff_ms: u64,
    },
}

impl Default for FlushPolicy {
    fn default() -> Self {
        FlushPolicy::AtMostOnce
    }
}

impl FlushPolicy {
    fn retry_executor(&self) -> Option<RetryExecutor> {
        match *self {
            FlushPolicy::AtMostOnce => None,
            FlushPolicy::Retry {
                max_retries,
                initial_backoff_ms,
                max_backoff_ms,
            } => Some(RetryExecutor::new(RetryConfig {
                max_retries,
                initial_backoff: Duration::from_millis(initial_backoff_ms),
                max_backoff: Duration::from_millis(max_backoff_ms.max(initial_backoff_ms)),
                ..RetryConfig::default()
            })),
        }
    }

    /// Submits `batch` to `worker` under this policy.
    ///
    /// Returns the last error once the policy gives up; the caller decides
    /// whether a dropped batch is fatal.
    pub async fn flush(
        &self,
        worker: &WorkerHandle,
        kind: JobKind,
        batch: &[ExecutionRequest],
    ) -> Result<(), TransportError> {
        let result = match self.retry_executor() {
            None => worker.submit(kind, batch).await,
            Some(executor) => executor
                .execute_if(is_unsent, move || worker.submit(kind, batch))
                .await
                .into_result(),
        };
        if let Err(e) = &result {
            error!(
                worker = %worker.address(),
                entries = batch.len(),
                error = %e,
                "dropping batch"
            );
        }
        result
    }
}
