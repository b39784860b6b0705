//! Retry logic with exponential backoff for RPC operations.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::{Result, TransportError};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3).
    pub max_retries: u32,
    /// Initial backoff duration (default: 100ms).
    pub initial_backoff: Duration,
    /// Maximum backoff duration (default: 10 seconds).
    pub max_backoff: Duration,
    /// Multiplier for exponential backoff (default: 2.0).
    pub backoff_multiplier: f64,
    /// Whether to add random jitter to backoff (default: true).
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Outcome of a retry operation.
#[derive(Debug)]
pub enum RetryOutcome<T> {
    /// Operation succeeded.
    Success(T),
    /// All retries exhausted, or the error was not retryable.
    Exhausted {
        /// The last error that occurred.
        last_error: TransportError,
        /// Total number of attempts made.
        attempts: u32,
    },
}

impl<T> RetryOutcome<T> {
    /// Converts the outcome into a plain `Result`, keeping the last error.
    pub fn into_result(self) -> Result<T> {
        match self {
            RetryOutcome::Success(value) => Ok(value),
            RetryOutcome::Exhausted { last_error, .. } => Err(last_error),
        }
    }
}

/// Executor for retry operations.
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Create a new RetryExecutor with the given configuration.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Execute an operation with retry logic.
    ///
    /// Only transient (retryable) errors are retried; permanent errors fail
    /// after the first attempt.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute_if(is_retryable, operation).await
    }

    /// Like [`execute`](Self::execute), retrying only errors `retryable`
    /// accepts.
    pub async fn execute_if<P, F, Fut, T>(&self, retryable: P, mut operation: F) -> RetryOutcome<T>
    where
        P: Fn(&TransportError) -> bool,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return RetryOutcome::Success(value),
                Err(e) => {
                    if !retryable(&e) || attempt > self.config.max_retries {
                        return RetryOutcome::Exhausted {
                            last_error: e,
                            attempts: attempt,
                        };
                    }
                    let backoff = self.compute_backoff(attempt - 1);
                    tracing::debug!(attempt, error = %e, backoff_ms = backoff.as_millis() as u64, "retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    /// Compute the exponential backoff duration for a given attempt.
    ///
    /// `initial_backoff * backoff_multiplier^attempt`, capped at `max_backoff`,
    /// plus up to 50% random jitter when enabled.
    fn compute_backoff(&self, attempt: u32) -> Duration {
        let base_delay_ms = self.config.initial_backoff.as_millis() as f64;
        let max_delay_ms = self.config.max_backoff.as_millis() as f64;

        let computed = base_delay_ms * self.config.backoff_multiplier.powi(attempt as i32);
        let capped = computed.min(max_delay_ms) as u64;

        if self.config.jitter && capped >= 2 {
            let jitter_ms = rand::thread_rng().gen_range(0..capped / 2);
            Duration::from_millis(capped.saturating_add(jitter_ms))
        } else {
            Duration::from_millis(capped)
        }
    }
}

/// Check if an error is retryable.
///
/// Transient: ConnectionReset, ConnectionTimeout, ConnectionRefused,
/// RequestTimeout, SendFailed, IoError. Everything else, including remote
/// rejections, is permanent.
pub fn is_retryable(error: &TransportError) -> bool {
    match error {
        TransportError::ConnectionReset
        | TransportError::ConnectionTimeout { .. }
        | TransportError::ConnectionRefused { .. }
        | TransportError::RequestTimeout { .. }
        | TransportError::SendFailed(_)
        | TransportError::IoError(_) => true,
        TransportError::InvalidMagic { .. }
        | TransportError::VersionMismatch { .. }
        | TransportError::ChecksumMismatch { .. }
        | TransportError::PayloadTooLarge { .. }
        | TransportError::UnknownOpcode(_)
        | TransportError::Remote { .. }
        | TransportError::SerializationError(_) => false,
    }
}

/// True when the request provably never reached the peer's handler.
///
/// The only safe retry condition for calls that are not idempotent: after a
/// timeout or reset the peer may still have handled the request.
pub fn is_unsent(error: &TransportError) -> bool {
    matches!(
        error,
        TransportError::SendFailed(_)
            | TransportError::ConnectionRefused { .. }
            | TransportError::ConnectionTimeout { .. }
    )
}
