#![warn(missing_docs)]

//! crazys3 coordinator: enumerates a bucket prefix, partitions the objects
//! across workers in batches, shuts the worker pools down with sentinels
//! and polls until every worker has finished.

/// Command line definition.
pub mod cli;
/// Coordinator configuration.
pub mod config;
pub mod batch;
pub mod error;
pub mod flush;
pub mod handle;
pub mod job;
pub mod partition;
pub mod poll;
pub mod region;
pub mod stream;

pub use batch::BatchBuffer;
pub use config::CoordinatorConfig;
pub use error::{CoordinatorError, Result};
pub use flush::FlushPolicy;
pub use handle::WorkerHandle;
pub use job::{Coordinator, DispatchStats, JobParams, JobReport, JobSpec, WorkerReport};
pub use partition::partition;
pub use poll::{CompletionPoller, PollOutcome, PollReport};
pub use region::{reconcile, RegionPlan};
pub use stream::WorkItemStream;
