#![warn(missing_docs)]

//! crazys3 worker: serves coordinator RPCs and runs bulk object operations
//! on a fixed pool of executors fed by a bounded queue.

/// Worker process configuration.
pub mod config;
pub mod endpoint;
pub mod error;
pub mod ops;
pub mod pool;
pub mod queue;
pub mod rpc;
pub mod session;

pub use config::WorkerConfig;
pub use endpoint::WorkerEndpoint;
pub use error::{Result, WorkerError};
pub use pool::WorkerPool;
pub use queue::WorkQueue;
pub use rpc::{
    ExecutionRequest, JobKind, JobStatus, MigrationTask, RecoveryTask, RestorationTask,
    SessionAck, SessionRequest, TaskStatus, WorkItem,
};
pub use session::{JobSession, StorageSession};
