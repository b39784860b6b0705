//! Error types for the storage client boundary.

use thiserror::Error;

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Error variants for object storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The bucket does not exist or is not visible to the credential.
    #[error("Bucket not found: {bucket}")]
    BucketNotFound {
        /// The bucket name.
        bucket: String,
    },

    /// The object does not exist.
    #[error("Object not found: {bucket}/{key}")]
    ObjectNotFound {
        /// The bucket name.
        bucket: String,
        /// The object key.
        key: String,
    },

    /// The backend refused the request.
    #[error("Access denied on {bucket}/{key}: {reason}")]
    AccessDenied {
        /// The bucket name.
        bucket: String,
        /// The object key, empty for bucket-level calls.
        key: String,
        /// Backend-provided reason.
        reason: String,
    },

    /// A restore was requested for an object that is not archived.
    #[error("Invalid object state for {bucket}/{key}: {reason}")]
    InvalidObjectState {
        /// The bucket name.
        bucket: String,
        /// The object key.
        key: String,
        /// Description of the state problem.
        reason: String,
    },

    /// No usable credential could be resolved.
    #[error("Credential error: {0}")]
    Credentials(String),

    /// Failure reported by the storage service or SDK.
    #[error("Backend error during {operation}: {message}")]
    Backend {
        /// The operation that failed, e.g. `CopyObject`.
        operation: &'static str,
        /// Error text from the backend.
        message: String,
    },
}

impl StorageError {
    /// Builds a [`StorageError::Backend`] for `operation`.
    pub fn backend(operation: &'static str, message: impl Into<String>) -> Self {
        StorageError::Backend {
            operation,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::ObjectNotFound {
            bucket: "logs".to_string(),
            key: "2024/01/a.gz".to_string(),
        };
        assert_eq!(err.to_string(), "Object not found: logs/2024/01/a.gz");

        let err = StorageError::backend("CopyObject", "slow down");
        assert_eq!(err.to_string(), "Backend error during CopyObject: slow down");
    }
}
