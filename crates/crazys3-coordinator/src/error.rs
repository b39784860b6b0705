//! Error types for the coordinator.

use crazys3_storage::StorageError;
use crazys3_transport::TransportError;
use thiserror::Error;

/// Result type alias for coordinator operations.
pub type Result<T> = std::result::Result<T, CoordinatorError>;

/// Error variants that abort a job.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The coordinator was configured without workers.
    #[error("No workers configured")]
    NoWorkers,

    /// Source and destination buckets live in different regions.
    #[error(
        "Region mismatch: source bucket {source_bucket} is in {source_region}, \
         destination bucket {dest_bucket} is in {dest_region}"
    )]
    RegionMismatch {
        /// Source bucket.
        source_bucket: String,
        /// Region of the source bucket.
        source_region: String,
        /// Destination bucket.
        dest_bucket: String,
        /// Region of the destination bucket.
        dest_region: String,
    },

    /// A worker answered the session call with `accepted = false`.
    #[error("Worker {worker} rejected the storage session")]
    SessionRejected {
        /// Worker address.
        worker: String,
    },

    /// The final batch carrying a worker's sentinels could not be delivered.
    /// That worker's job is aborted; workers that got their sentinels finish
    /// their share.
    #[error("Failed to deliver sentinels to {worker}: {source}")]
    SentinelDelivery {
        /// Worker address.
        worker: String,
        /// The last transport error.
        #[source]
        source: TransportError,
    },

    /// An RPC to a worker failed.
    #[error("RPC to {worker} failed: {source}")]
    Transport {
        /// Worker address.
        worker: String,
        /// The transport error.
        #[source]
        source: TransportError,
    },

    /// Enumeration, region lookup or credential resolution failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl CoordinatorError {
    /// Wraps a transport error with the worker it came from.
    pub fn transport(worker: &str, source: TransportError) -> Self {
        CoordinatorError::Transport {
            worker: worker.to_string(),
            source,
        }
    }
}
