//! Storage session and job session state.
//!
//! A [`StorageSession`] is built once per `SessionInfo` call and never
//! mutated; every [`JobSession`] started afterwards shares it. The job
//! session owns the work queue and the shutdown barrier: its status reaches
//! Finished exactly when all `pool_size` executors have exited.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crazys3_storage::ObjectStore;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use crate::queue::WorkQueue;
use crate::rpc::{JobKind, JobStatus, TaskStatus};

/// Immutable storage client configuration for one session.
pub struct StorageSession {
    /// Credential profile the coordinator used.
    pub profile: String,
    /// Region the client is connected to.
    pub region: String,
    /// The connected store.
    pub store: Arc<dyn ObjectStore>,
}

impl fmt::Debug for StorageSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageSession")
            .field("profile", &self.profile)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct Barrier {
    status: JobStatus,
    active_executors: usize,
    finished_executors: usize,
    sentinels_enqueued: bool,
    aborted: bool,
}

/// State of one job on one worker.
#[derive(Debug)]
pub struct JobSession {
    id: Uuid,
    kind: JobKind,
    storage: Arc<StorageSession>,
    queue: WorkQueue,
    pool_size: usize,
    barrier: Mutex<Barrier>,
    status_tx: watch::Sender<JobStatus>,
    processed: AtomicU64,
    failed: AtomicU64,
}

impl JobSession {
    /// Creates a Pending job with a fresh queue.
    pub fn new(
        kind: JobKind,
        storage: Arc<StorageSession>,
        pool_size: usize,
        queue_capacity: usize,
    ) -> Self {
        let (status_tx, _) = watch::channel(JobStatus::Pending);
        Self {
            id: Uuid::new_v4(),
            kind,
            storage,
            queue: WorkQueue::new(queue_capacity),
            pool_size: pool_size.max(1),
            barrier: Mutex::new(Barrier {
                status: JobStatus::Pending,
                active_executors: 0,
                finished_executors: 0,
                sentinels_enqueued: false,
                aborted: false,
            }),
            status_tx,
            processed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Job id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Job kind.
    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Shared storage session.
    pub fn storage(&self) -> &Arc<StorageSession> {
        &self.storage
    }

    /// The job's work queue.
    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    /// Number of executors.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Current status.
    pub fn status(&self) -> JobStatus {
        self.barrier.lock().status
    }

    /// True while Pending or Running.
    pub fn is_active(&self) -> bool {
        matches!(self.status(), JobStatus::Pending | JobStatus::Running)
    }

    /// Pending -> Running with every executor counted as active.
    /// Returns false if the job was not Pending.
    pub fn mark_running(&self) -> bool {
        let mut barrier = self.barrier.lock();
        if barrier.status != JobStatus::Pending {
            return false;
        }
        barrier.status = JobStatus::Running;
        barrier.active_executors = self.pool_size;
        self.status_tx.send_replace(JobStatus::Running);
        true
    }

    /// Called by each executor as it exits.
    ///
    /// The status becomes Finished exactly when the last of the
    /// `pool_size` executors has exited.
    pub fn executor_exited(&self) {
        let mut barrier = self.barrier.lock();
        barrier.finished_executors += 1;
        barrier.active_executors = barrier.active_executors.saturating_sub(1);
        if barrier.finished_executors == self.pool_size {
            barrier.status = JobStatus::Finished;
            self.status_tx.send_replace(JobStatus::Finished);
            info!(
                job_id = %self.id,
                kind = %self.kind,
                processed = self.processed.load(Ordering::Relaxed),
                failed = self.failed.load(Ordering::Relaxed),
                aborted = barrier.aborted,
                "job finished"
            );
        }
    }

    /// Executors currently running.
    pub fn active_executors(&self) -> usize {
        self.barrier.lock().active_executors
    }

    /// Executors that have exited.
    pub fn finished_executors(&self) -> usize {
        self.barrier.lock().finished_executors
    }

    /// Claims the right to enqueue this job's sentinels.
    /// Returns true for the first caller only.
    pub fn claim_sentinels(&self) -> bool {
        let mut barrier = self.barrier.lock();
        !std::mem::replace(&mut barrier.sentinels_enqueued, true)
    }

    /// Stops an active job: closes the queue so executors exit without
    /// running what is still queued. Returns false if the job was already
    /// finished or aborted.
    pub fn abort(&self) -> bool {
        {
            let mut barrier = self.barrier.lock();
            if barrier.aborted || barrier.status == JobStatus::Finished {
                return false;
            }
            barrier.aborted = true;
        }
        self.queue.close();
        warn!(job_id = %self.id, kind = %self.kind, queued = self.queue.len(), "job aborted");
        true
    }

    /// True once [`abort`](Self::abort) took effect.
    pub fn is_aborted(&self) -> bool {
        self.barrier.lock().aborted
    }

    /// Waits until the job is Finished.
    pub async fn wait_finished(&self) {
        let mut rx = self.status_tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|s| *s == JobStatus::Finished).await;
    }

    /// Counts one successful object.
    pub fn record_success(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one failed object.
    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Status reply for this job.
    pub fn task_status(&self) -> TaskStatus {
        let status = self.status();
        TaskStatus {
            finished: status == JobStatus::Finished,
            status,
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            pool_size: self.pool_size,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crazys3_storage::{Credentials, MemoryBackend};

    pub(crate) fn storage_session(backend: &MemoryBackend) -> Arc<StorageSession> {
        Arc::new(StorageSession {
            profile: "default".to_string(),
            region: "us-west-2".to_string(),
            store: Arc::new(backend.store("us-west-2", Credentials::new("AKIA", "s"))),
        })
    }

    #[test]
    fn test_barrier_flips_on_last_exit() {
        let session = JobSession::new(JobKind::Recovery, storage_session(&MemoryBackend::new()), 3, 16);
        assert_eq!(session.status(), JobStatus::Pending);
        assert!(session.mark_running());
        assert!(!session.mark_running());
        assert_eq!(session.active_executors(), 3);

        session.executor_exited();
        session.executor_exited();
        assert_eq!(session.status(), JobStatus::Running);
        assert_eq!(session.finished_executors(), 2);

        session.executor_exited();
        assert_eq!(session.status(), JobStatus::Finished);
        assert_eq!(session.active_executors(), 0);
        assert!(session.task_status().finished);
    }

    #[test]
    fn test_abort_only_once_and_not_after_finish() {
        let session = JobSession::new(JobKind::Recovery, storage_session(&MemoryBackend::new()), 1, 4);
        assert!(session.abort());
        assert!(!session.abort());
        assert!(session.is_aborted());

        let done = JobSession::new(JobKind::Recovery, storage_session(&MemoryBackend::new()), 1, 4);
        done.mark_running();
        done.executor_exited();
        assert!(!done.abort());
    }

    #[test]
    fn test_sentinels_claimed_once() {
        let session = JobSession::new(JobKind::Migration, storage_session(&MemoryBackend::new()), 2, 16);
        assert!(session.claim_sentinels());
        assert!(!session.claim_sentinels());
    }

    #[tokio::test]
    async fn test_wait_finished_wakes() {
        let session = Arc::new(JobSession::new(
            JobKind::Restoration,
            storage_session(&MemoryBackend::new()),
            1,
            16,
        ));
        session.mark_running();
        let waiter = {
            let session = session.clone();
            tokio::spawn(async move { session.wait_finished().await })
        };
        session.executor_exited();
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
