#![warn(missing_docs)]

//! crazys3 storage subsystem: the object storage client boundary.
//!
//! Coordinator and workers talk to object storage only through the
//! [`ObjectStore`] and [`StorageConnector`] traits. The in-memory backend
//! serves tests and dry runs; the S3 backend is behind the `s3` feature.

pub mod error;
pub mod memory;
pub mod store;
pub mod types;

#[cfg(feature = "s3")]
pub mod s3;

pub use error::{Result, StorageError};
pub use memory::{MemoryBackend, MemoryConnector, MemoryObject, MemoryStore, MemoryStoreStats, RestoreRecord};
pub use store::{ObjectStore, StorageConnector};
pub use types::{
    CredentialSource, Credentials, Grant, Grantee, ObjectAcl, ObjectPage, ObjectSummary, Owner,
    Permission, RestoreTier, SecretString, StorageClass,
};

#[cfg(feature = "s3")]
pub use s3::{S3Connector, S3Store};
