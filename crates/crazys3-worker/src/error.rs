//! Error types for the worker.

use crazys3_storage::StorageError;
use crazys3_transport::TransportError;
use thiserror::Error;

use crate::rpc::JobKind;

/// Result type alias for worker operations.
pub type Result<T> = std::result::Result<T, WorkerError>;

/// Error variants returned by the worker endpoint and pool.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// A job or submit arrived before the storage session or job was set up.
    #[error("Session not ready: {0}")]
    SessionNotReady(&'static str),

    /// A job is still running; it must finish first.
    #[error("Job {job_id} is still running")]
    JobRunning {
        /// The running job.
        job_id: String,
    },

    /// The submitted work does not belong to the running job.
    #[error("Kind mismatch: job is {expected}, request is {got}")]
    KindMismatch {
        /// Kind of the armed job.
        expected: JobKind,
        /// Kind of the offending request.
        got: JobKind,
    },

    /// The job already finished; no more work is accepted.
    #[error("Job {job_id} already finished")]
    JobFinished {
        /// The finished job.
        job_id: String,
    },

    /// The work queue was closed.
    #[error("Work queue closed")]
    QueueClosed,

    /// Storage backend failure.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Transport or payload codec failure.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}
