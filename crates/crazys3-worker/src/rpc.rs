//! RPC contract between the coordinator and workers.
//!
//! Every request and reply body is bincode-encoded with the transport's
//! message helpers. The opcode alone decides which body type is expected.

use std::fmt;

use crazys3_storage::{RestoreTier, SecretString, StorageClass};
use crazys3_transport::Opcode;
use serde::{Deserialize, Serialize};

/// One object to process, as produced by enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Position in the enumeration pass, starting at 1.
    pub sequence_id: u64,
    /// Source bucket.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Size in bytes.
    pub size: i64,
    /// Storage class at enumeration time.
    pub storage_class: StorageClass,
}

/// The three bulk operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobKind {
    /// Copy objects to another bucket, preserving ACLs.
    Migration,
    /// Request Glacier restores.
    Restoration,
    /// Re-write archived objects in place as STANDARD.
    Recovery,
}

impl JobKind {
    /// Opcode that arms a job of this kind on a worker.
    pub fn start_opcode(self) -> Opcode {
        match self {
            JobKind::Migration => Opcode::StartMigration,
            JobKind::Restoration => Opcode::StartRestoration,
            JobKind::Recovery => Opcode::StartRecovery,
        }
    }

    /// Opcode that submits a batch for this kind.
    pub fn submit_opcode(self) -> Opcode {
        match self {
            JobKind::Migration => Opcode::SubmitMigration,
            JobKind::Restoration => Opcode::SubmitRestoration,
            JobKind::Recovery => Opcode::SubmitRecovery,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobKind::Migration => "migration",
            JobKind::Restoration => "restoration",
            JobKind::Recovery => "recovery",
        };
        f.write_str(name)
    }
}

/// Copy `item` to `dest_bucket/dest_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationTask {
    /// Source object.
    pub item: WorkItem,
    /// Destination bucket.
    pub dest_bucket: String,
    /// Destination key.
    pub dest_key: String,
}

/// Restore `item` for `days` at `tier`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestorationTask {
    /// Archived object.
    pub item: WorkItem,
    /// Restore lifetime in days.
    pub days: i32,
    /// Retrieval tier.
    pub tier: RestoreTier,
}

/// Re-write `item` in place as STANDARD.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryTask {
    /// Object to recover.
    pub item: WorkItem,
}

/// A unit of work on a worker queue.
///
/// `Sentinel` tells exactly one executor to exit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionRequest {
    /// Copy task.
    Migration(MigrationTask),
    /// Restore task.
    Restoration(RestorationTask),
    /// In-place recovery task.
    Recovery(RecoveryTask),
    /// Executor shutdown marker.
    Sentinel,
}

impl ExecutionRequest {
    /// True only for [`ExecutionRequest::Sentinel`].
    pub fn is_sentinel(&self) -> bool {
        matches!(self, ExecutionRequest::Sentinel)
    }

    /// Kind of a non-sentinel request.
    pub fn job_kind(&self) -> Option<JobKind> {
        match self {
            ExecutionRequest::Migration(_) => Some(JobKind::Migration),
            ExecutionRequest::Restoration(_) => Some(JobKind::Restoration),
            ExecutionRequest::Recovery(_) => Some(JobKind::Recovery),
            ExecutionRequest::Sentinel => None,
        }
    }

    /// The work item carried by a non-sentinel request.
    pub fn item(&self) -> Option<&WorkItem> {
        match self {
            ExecutionRequest::Migration(t) => Some(&t.item),
            ExecutionRequest::Restoration(t) => Some(&t.item),
            ExecutionRequest::Recovery(t) => Some(&t.item),
            ExecutionRequest::Sentinel => None,
        }
    }
}

/// Storage session parameters sent to every worker before a job.
///
/// The secret travels in cleartext on the RPC channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRequest {
    /// Credential profile name.
    pub profile: String,
    /// Region of the job's buckets.
    pub region: String,
    /// Access key id; empty means "use the profile".
    pub access_key: String,
    /// Secret access key.
    pub secret_key: SecretString,
    /// Session token of temporary credentials.
    pub session_token: Option<SecretString>,
}

/// Reply to [`SessionRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionAck {
    /// Whether the session was installed.
    pub accepted: bool,
    /// Number of executors this worker runs per job.
    pub pool_size: usize,
}

/// Lifecycle of a worker's current job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    /// No job has been started.
    Idle,
    /// Job created, executors not yet running.
    Pending,
    /// Executors running.
    Running,
    /// Every executor has exited.
    Finished,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStatus::Idle => "idle",
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// Reply to a `TaskStatus` poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    /// True iff the current job is Finished.
    pub finished: bool,
    /// Current job status.
    pub status: JobStatus,
    /// Objects processed successfully.
    pub processed: u64,
    /// Objects whose operation failed.
    pub failed: u64,
    /// Executors per job.
    pub pool_size: usize,
}

impl TaskStatus {
    /// Status of a worker with no job.
    pub fn idle(pool_size: usize) -> Self {
        Self {
            finished: false,
            status: JobStatus::Idle,
            processed: 0,
            failed: 0,
            pool_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crazys3_transport::message::{deserialize_message, serialize_message};

    fn item() -> WorkItem {
        WorkItem {
            sequence_id: 7,
            bucket: "archive".to_string(),
            key: "2023/report.csv".to_string(),
            size: 4096,
            storage_class: StorageClass::Glacier,
        }
    }

    #[test]
    fn test_sentinel_has_no_kind_or_item() {
        let sentinel = ExecutionRequest::Sentinel;
        assert!(sentinel.is_sentinel());
        assert_eq!(sentinel.job_kind(), None);
        assert!(sentinel.item().is_none());

        let task = ExecutionRequest::Recovery(RecoveryTask { item: item() });
        assert!(!task.is_sentinel());
        assert_eq!(task.job_kind(), Some(JobKind::Recovery));
        assert_eq!(task.item().map(|i| i.sequence_id), Some(7));
    }

    #[test]
    fn test_batch_encodes_on_the_wire() {
        let batch = vec![
            ExecutionRequest::Restoration(RestorationTask {
                item: item(),
                days: 3,
                tier: RestoreTier::Bulk,
            }),
            ExecutionRequest::Sentinel,
        ];
        let bytes = serialize_message(&batch).unwrap();
        let decoded: Vec<ExecutionRequest> = deserialize_message(&bytes).unwrap();
        assert_eq!(decoded, batch);
    }

    #[test]
    fn test_opcodes_per_kind() {
        assert_eq!(JobKind::Migration.start_opcode(), Opcode::StartMigration);
        assert_eq!(JobKind::Recovery.submit_opcode(), Opcode::SubmitRecovery);
    }

    #[test]
    fn test_session_request_debug_hides_secret() {
        let req = SessionRequest {
            profile: "default".to_string(),
            region: "us-west-2".to_string(),
            access_key: "AKIA".to_string(),
            secret_key: SecretString::new("hunter2"),
            session_token: Some(SecretString::new("token-value")),
        };
        let printed = format!("{:?}", req);
        assert!(!printed.contains("hunter2"));
        assert!(!printed.contains("token-value"));
    }
}
