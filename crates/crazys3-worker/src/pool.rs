//! Executor pool draining a job's work queue.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::ops;
use crate::rpc::ExecutionRequest;
use crate::session::JobSession;

/// The executors of one job.
#[derive(Debug)]
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Marks the session Running and spawns `pool_size` executors.
    ///
    /// Each executor pops requests until it takes a sentinel, the queue
    /// closes, or the job is aborted, then reports its exit to the session
    /// barrier.
    pub fn start(session: Arc<JobSession>) -> Self {
        session.mark_running();
        info!(
            job_id = %session.id(),
            kind = %session.kind(),
            pool_size = session.pool_size(),
            "starting worker pool"
        );
        let handles = (0..session.pool_size())
            .map(|index| {
                let session = session.clone();
                tokio::spawn(async move { run_executor(index, &session).await })
            })
            .collect();
        Self { handles }
    }

    /// Waits for every executor task to return.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "executor task failed");
            }
        }
    }
}

async fn run_executor(index: usize, session: &JobSession) {
    let store = session.storage().store.clone();
    loop {
        let request = match session.queue().pop().await {
            Some(ExecutionRequest::Sentinel) | None => break,
            Some(_) if session.is_aborted() => break,
            Some(request) => request,
        };
        match ops::execute(store.as_ref(), &request).await {
            Ok(()) => session.record_success(),
            Err(e) => {
                session.record_failure();
                let key = request.item().map(|i| i.key.as_str()).unwrap_or_default();
                warn!(executor = index, key, error = %e, "operation failed");
            }
        }
    }
    debug!(executor = index, job_id = %session.id(), "executor exiting");
    session.executor_exited();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{JobKind, JobStatus, RecoveryTask, WorkItem};
    use crate::session::tests::storage_session;
    use crazys3_storage::{MemoryBackend, StorageClass};
    use std::time::Duration;

    fn seeded(n: usize) -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend.create_bucket("b", "us-west-2");
        for i in 0..n {
            backend.put_object("b", &format!("k{i}"), 1, StorageClass::Glacier);
        }
        backend
    }

    fn recovery(i: usize) -> ExecutionRequest {
        ExecutionRequest::Recovery(RecoveryTask {
            item: WorkItem {
                sequence_id: i as u64 + 1,
                bucket: "b".to_string(),
                key: format!("k{i}"),
                size: 1,
                storage_class: StorageClass::Glacier,
            },
        })
    }

    #[tokio::test]
    async fn test_pool_finishes_after_all_sentinels() {
        let backend = seeded(20);
        let session = Arc::new(JobSession::new(JobKind::Recovery, storage_session(&backend), 4, 64));
        let pool = WorkerPool::start(session.clone());
        assert_eq!(session.status(), JobStatus::Running);

        for i in 0..20 {
            session.queue().push(recovery(i)).await.unwrap();
        }
        for _ in 0..4 {
            session.queue().push(ExecutionRequest::Sentinel).await.unwrap();
        }

        tokio::time::timeout(Duration::from_secs(5), session.wait_finished())
            .await
            .unwrap();
        pool.join().await;

        let status = session.task_status();
        assert!(status.finished);
        assert_eq!(status.processed, 20);
        assert_eq!(status.failed, 0);
        assert_eq!(session.finished_executors(), 4);
    }

    #[tokio::test]
    async fn test_fewer_sentinels_never_finish() {
        let backend = seeded(2);
        let session = Arc::new(JobSession::new(JobKind::Recovery, storage_session(&backend), 3, 64));
        let _pool = WorkerPool::start(session.clone());

        session.queue().push(recovery(0)).await.unwrap();
        session.queue().push(ExecutionRequest::Sentinel).await.unwrap();
        session.queue().push(ExecutionRequest::Sentinel).await.unwrap();

        let waited = tokio::time::timeout(Duration::from_millis(200), session.wait_finished()).await;
        assert!(waited.is_err());
        assert_eq!(session.status(), JobStatus::Running);
        assert_eq!(session.finished_executors(), 2);
        assert_eq!(session.active_executors(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_counted_and_skipped() {
        let backend = seeded(3);
        backend.fail_key("b", "k1");
        let session = Arc::new(JobSession::new(JobKind::Recovery, storage_session(&backend), 1, 16));
        let pool = WorkerPool::start(session.clone());

        for i in 0..3 {
            session.queue().push(recovery(i)).await.unwrap();
        }
        session.queue().push(ExecutionRequest::Sentinel).await.unwrap();
        pool.join().await;

        let status = session.task_status();
        assert_eq!(status.processed, 2);
        assert_eq!(status.failed, 1);
        assert!(status.finished);
    }

    #[tokio::test]
    async fn test_aborted_job_skips_queued_work() {
        let backend = seeded(10);
        let session = Arc::new(JobSession::new(JobKind::Recovery, storage_session(&backend), 2, 64));
        for i in 0..10 {
            session.queue().push(recovery(i)).await.unwrap();
        }
        assert!(session.abort());

        let pool = WorkerPool::start(session.clone());
        tokio::time::timeout(Duration::from_secs(5), pool.join())
            .await
            .unwrap();

        let status = session.task_status();
        assert_eq!(status.status, JobStatus::Finished);
        assert_eq!(status.processed + status.failed, 0);
        assert_eq!(backend.stats().copies, 0);
    }
}
