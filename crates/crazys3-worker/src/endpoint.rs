//! Worker RPC endpoint.
//!
//! Dispatches coordinator calls by opcode: installs storage sessions, arms
//! jobs, feeds submitted batches into the job's queue and answers status
//! polls. The state lock is never held across an await, so a status poll is
//! answered even while a submit waits on a full queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use crazys3_storage::{CredentialSource, Credentials, StorageConnector};
use crazys3_transport::message::{deserialize_message, serialize_message};
use crazys3_transport::{Opcode, RpcHandler};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Result, WorkerError};
use crate::pool::WorkerPool;
use crate::rpc::{ExecutionRequest, JobKind, JobStatus, SessionAck, SessionRequest, TaskStatus};
use crate::session::{JobSession, StorageSession};

#[derive(Debug, Default)]
struct EndpointState {
    storage: Option<Arc<StorageSession>>,
    job: Option<Arc<JobSession>>,
}

impl EndpointState {
    fn ensure_idle(&self) -> Result<()> {
        match &self.job {
            Some(job) if job.is_active() => Err(WorkerError::JobRunning {
                job_id: job.id().to_string(),
            }),
            _ => Ok(()),
        }
    }
}

/// RPC handler of a worker process.
pub struct WorkerEndpoint {
    connector: Arc<dyn StorageConnector>,
    pool_size: usize,
    queue_capacity: usize,
    state: Mutex<EndpointState>,
    warned_cleartext: AtomicBool,
}

impl WorkerEndpoint {
    /// Creates an endpoint that opens stores through `connector`.
    pub fn new(connector: Arc<dyn StorageConnector>, pool_size: usize, queue_capacity: usize) -> Self {
        Self {
            connector,
            pool_size: pool_size.max(1),
            queue_capacity: queue_capacity.max(1),
            state: Mutex::new(EndpointState::default()),
            warned_cleartext: AtomicBool::new(false),
        }
    }

    /// Executors started per job.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// The current job, if any.
    pub fn current_job(&self) -> Option<Arc<JobSession>> {
        self.state.lock().job.clone()
    }

    /// Installs a storage session built from `request`.
    pub async fn open_session(&self, request: SessionRequest) -> Result<SessionAck> {
        self.state.lock().ensure_idle()?;
        if !self.warned_cleartext.swap(true, Ordering::Relaxed) {
            warn!("storage credentials arrive unencrypted over the RPC channel");
        }

        let source = if request.access_key.is_empty() {
            CredentialSource::Profile(request.profile.clone())
        } else {
            CredentialSource::Static(Credentials {
                access_key: request.access_key.clone(),
                secret_key: request.secret_key.clone(),
                session_token: request.session_token.clone(),
            })
        };
        let store = self.connector.connect(&request.region, &source).await?;
        let session = Arc::new(StorageSession {
            profile: request.profile,
            region: request.region,
            store,
        });

        let mut state = self.state.lock();
        state.ensure_idle()?;
        info!(profile = %session.profile, region = %session.region, "storage session installed");
        state.storage = Some(session);
        Ok(SessionAck {
            accepted: true,
            pool_size: self.pool_size,
        })
    }

    /// Creates a job of `kind` and starts its executors.
    pub fn start_job(&self, kind: JobKind) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_idle()?;
        let storage = state
            .storage
            .clone()
            .ok_or(WorkerError::SessionNotReady("no storage session installed"))?;
        let job = Arc::new(JobSession::new(
            kind,
            storage,
            self.pool_size,
            self.queue_capacity,
        ));
        // Executors are detached; the job session's barrier tracks them.
        let _pool = WorkerPool::start(job.clone());
        info!(job_id = %job.id(), %kind, "job started");
        state.job = Some(job);
        Ok(())
    }

    /// Enqueues a submitted batch in order.
    ///
    /// The first sentinel seen by a job expands into `pool_size` sentinels;
    /// any later sentinel for the same job is dropped.
    pub async fn submit(&self, kind: JobKind, batch: Vec<ExecutionRequest>) -> Result<()> {
        let job = self
            .state
            .lock()
            .job
            .clone()
            .ok_or(WorkerError::SessionNotReady("no job started"))?;
        if job.kind() != kind {
            return Err(WorkerError::KindMismatch {
                expected: job.kind(),
                got: kind,
            });
        }
        if job.status() == JobStatus::Finished {
            return Err(WorkerError::JobFinished {
                job_id: job.id().to_string(),
            });
        }
        if let Some(got) = batch
            .iter()
            .filter_map(ExecutionRequest::job_kind)
            .find(|k| *k != kind)
        {
            return Err(WorkerError::KindMismatch {
                expected: kind,
                got,
            });
        }

        debug!(job_id = %job.id(), entries = batch.len(), "batch received");
        for request in batch {
            if request.is_sentinel() {
                if job.claim_sentinels() {
                    for _ in 0..job.pool_size() {
                        job.queue().push(ExecutionRequest::Sentinel).await?;
                    }
                    debug!(job_id = %job.id(), count = job.pool_size(), "sentinels enqueued");
                } else {
                    debug!(job_id = %job.id(), "duplicate sentinel ignored");
                }
                continue;
            }
            job.queue().push(request).await?;
        }
        Ok(())
    }

    /// Aborts the current job and waits until its executors have exited.
    ///
    /// Returns false when there was no active job to stop. Afterwards the
    /// worker accepts a new session or job.
    pub async fn abort_job(&self) -> bool {
        let job = self.state.lock().job.clone();
        let Some(job) = job else {
            return false;
        };
        if !job.abort() {
            return false;
        }
        job.wait_finished().await;
        info!(job_id = %job.id(), "aborted job released its executors");
        true
    }

    /// Status of the current job.
    pub fn task_status(&self) -> TaskStatus {
        match &self.state.lock().job {
            Some(job) => job.task_status(),
            None => TaskStatus::idle(self.pool_size),
        }
    }

    async fn dispatch(&self, opcode: Opcode, payload: Vec<u8>) -> Result<Vec<u8>> {
        match opcode {
            Opcode::Heartbeat => Ok(payload),
            Opcode::SessionInfo => {
                let request: SessionRequest = deserialize_message(&payload)?;
                let ack = self.open_session(request).await?;
                Ok(serialize_message(&ack)?)
            }
            Opcode::StartMigration => self.start_and_ack(JobKind::Migration),
            Opcode::StartRestoration => self.start_and_ack(JobKind::Restoration),
            Opcode::StartRecovery => self.start_and_ack(JobKind::Recovery),
            Opcode::SubmitMigration => self.submit_and_ack(JobKind::Migration, &payload).await,
            Opcode::SubmitRestoration => self.submit_and_ack(JobKind::Restoration, &payload).await,
            Opcode::SubmitRecovery => self.submit_and_ack(JobKind::Recovery, &payload).await,
            Opcode::TaskStatus => Ok(serialize_message(&self.task_status())?),
            Opcode::AbortJob => Ok(serialize_message(&self.abort_job().await)?),
        }
    }

    fn start_and_ack(&self, kind: JobKind) -> Result<Vec<u8>> {
        self.start_job(kind)?;
        Ok(serialize_message(&())?)
    }

    async fn submit_and_ack(&self, kind: JobKind, payload: &[u8]) -> Result<Vec<u8>> {
        let batch: Vec<ExecutionRequest> = deserialize_message(payload)?;
        self.submit(kind, batch).await?;
        Ok(serialize_message(&())?)
    }
}

#[async_trait]
impl RpcHandler for WorkerEndpoint {
    type Error = WorkerError;

    async fn handle(&self, opcode: Opcode, payload: Vec<u8>) -> Result<Vec<u8>> {
        debug!(?opcode, bytes = payload.len(), "command received");
        self.dispatch(opcode, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{RecoveryTask, RestorationTask, WorkItem};
    use crazys3_storage::{
        MemoryBackend, MemoryConnector, ObjectStore, RestoreTier, SecretString, StorageClass,
    };
    use std::time::Duration;

    fn endpoint(backend: &MemoryBackend, pool_size: usize, queue_capacity: usize) -> WorkerEndpoint {
        let connector = MemoryConnector::new(backend.clone());
        WorkerEndpoint::new(Arc::new(connector), pool_size, queue_capacity)
    }

    fn session_request() -> SessionRequest {
        SessionRequest {
            profile: "default".to_string(),
            region: "us-west-2".to_string(),
            access_key: "AKIA".to_string(),
            secret_key: SecretString::new("s"),
            session_token: None,
        }
    }

    fn seeded(n: usize) -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend.create_bucket("b", "us-west-2");
        for i in 0..n {
            backend.put_object("b", &format!("k{i}"), 1, StorageClass::Glacier);
        }
        backend
    }

    fn item(i: usize) -> WorkItem {
        WorkItem {
            sequence_id: i as u64 + 1,
            bucket: "b".to_string(),
            key: format!("k{i}"),
            size: 1,
            storage_class: StorageClass::Glacier,
        }
    }

    fn recovery(i: usize) -> ExecutionRequest {
        ExecutionRequest::Recovery(RecoveryTask { item: item(i) })
    }

    #[tokio::test]
    async fn test_start_before_session_is_rejected() {
        let ep = endpoint(&seeded(0), 2, 16);
        assert!(matches!(
            ep.start_job(JobKind::Recovery),
            Err(WorkerError::SessionNotReady(_))
        ));
        assert!(matches!(
            ep.submit(JobKind::Recovery, vec![recovery(0)]).await,
            Err(WorkerError::SessionNotReady(_))
        ));
        assert_eq!(ep.task_status().status, JobStatus::Idle);
    }

    #[tokio::test]
    async fn test_session_ack_reports_pool_size() {
        let ep = endpoint(&seeded(0), 3, 16);
        let ack = ep.open_session(session_request()).await.unwrap();
        assert!(ack.accepted);
        assert_eq!(ack.pool_size, 3);
    }

    #[tokio::test]
    async fn test_full_job_with_duplicate_sentinels() {
        let backend = seeded(10);
        let ep = endpoint(&backend, 3, 64);
        ep.open_session(session_request()).await.unwrap();
        ep.start_job(JobKind::Recovery).unwrap();

        let mut batch: Vec<_> = (0..10).map(recovery).collect();
        batch.extend(std::iter::repeat(ExecutionRequest::Sentinel).take(3));
        ep.submit(JobKind::Recovery, batch).await.unwrap();
        ep.submit(JobKind::Recovery, vec![ExecutionRequest::Sentinel])
            .await
            .unwrap();

        let job = ep.current_job().unwrap();
        tokio::time::timeout(Duration::from_secs(5), job.wait_finished())
            .await
            .unwrap();
        let status = ep.task_status();
        assert!(status.finished);
        assert_eq!(status.processed, 10);
        assert!(job.queue().is_empty());
    }

    #[tokio::test]
    async fn test_start_while_running_is_rejected() {
        let ep = endpoint(&seeded(0), 2, 16);
        ep.open_session(session_request()).await.unwrap();
        ep.start_job(JobKind::Recovery).unwrap();

        assert!(matches!(
            ep.start_job(JobKind::Recovery),
            Err(WorkerError::JobRunning { .. })
        ));
        assert!(matches!(
            ep.open_session(session_request()).await,
            Err(WorkerError::JobRunning { .. })
        ));
    }

    #[tokio::test]
    async fn test_restart_after_finish_gets_fresh_job() {
        let ep = endpoint(&seeded(0), 1, 16);
        ep.open_session(session_request()).await.unwrap();
        ep.start_job(JobKind::Recovery).unwrap();
        let first = ep.current_job().unwrap();
        ep.submit(JobKind::Recovery, vec![ExecutionRequest::Sentinel])
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), first.wait_finished())
            .await
            .unwrap();

        assert!(matches!(
            ep.submit(JobKind::Recovery, vec![recovery(0)]).await,
            Err(WorkerError::JobFinished { .. })
        ));

        ep.start_job(JobKind::Restoration).unwrap();
        let second = ep.current_job().unwrap();
        assert_ne!(first.id(), second.id());
        assert!(Arc::ptr_eq(first.storage(), second.storage()));
        assert_eq!(second.status(), JobStatus::Running);
    }

    #[tokio::test]
    async fn test_kind_mismatch() {
        let ep = endpoint(&seeded(1), 1, 16);
        ep.open_session(session_request()).await.unwrap();
        ep.start_job(JobKind::Recovery).unwrap();

        assert!(matches!(
            ep.submit(JobKind::Migration, vec![]).await,
            Err(WorkerError::KindMismatch { .. })
        ));
        let restore = ExecutionRequest::Restoration(RestorationTask {
            item: item(0),
            days: 1,
            tier: RestoreTier::Bulk,
        });
        assert!(matches!(
            ep.submit(JobKind::Recovery, vec![recovery(0), restore]).await,
            Err(WorkerError::KindMismatch { expected: JobKind::Recovery, got: JobKind::Restoration })
        ));
        assert!(ep.current_job().unwrap().queue().is_empty());
    }

    #[tokio::test]
    async fn test_status_answered_while_submit_blocks() {
        let backend = seeded(0);
        let ep = Arc::new(endpoint(&backend, 1, 1));
        ep.open_session(session_request()).await.unwrap();
        ep.start_job(JobKind::Recovery).unwrap();
        let job = ep.current_job().unwrap();
        // Every object is missing so each entry fails fast, but a queue of
        // one still makes the submit wait on the executor.
        let submit = {
            let ep = ep.clone();
            tokio::spawn(async move {
                let batch: Vec<_> = (0..200).map(recovery).collect();
                ep.submit(JobKind::Recovery, batch).await
            })
        };

        let status = ep.task_status();
        assert_eq!(status.status, JobStatus::Running);

        submit.await.unwrap().unwrap();
        ep.submit(JobKind::Recovery, vec![ExecutionRequest::Sentinel])
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), job.wait_finished())
            .await
            .unwrap();
        assert_eq!(ep.task_status().failed, 200);
    }

    #[tokio::test]
    async fn test_dispatch_heartbeat_and_status() {
        let ep = endpoint(&seeded(0), 2, 16);
        let echo = ep.handle(Opcode::Heartbeat, b"ping".to_vec()).await.unwrap();
        assert_eq!(echo, b"ping");

        let bytes = ep.handle(Opcode::TaskStatus, vec![]).await.unwrap();
        let status: TaskStatus = deserialize_message(&bytes).unwrap();
        assert_eq!(status, TaskStatus::idle(2));
    }

    #[tokio::test]
    async fn test_abort_releases_a_job_without_sentinels() {
        let backend = seeded(5);
        let ep = endpoint(&backend, 2, 64);
        ep.open_session(session_request()).await.unwrap();
        ep.start_job(JobKind::Recovery).unwrap();
        ep.submit(JobKind::Recovery, (0..5).map(recovery).collect())
            .await
            .unwrap();

        let stopped = tokio::time::timeout(Duration::from_secs(5), ep.abort_job())
            .await
            .unwrap();
        assert!(stopped);
        assert!(ep.task_status().finished);
        assert!(!ep.abort_job().await);

        ep.open_session(session_request()).await.unwrap();
        ep.start_job(JobKind::Recovery).unwrap();
        assert_eq!(ep.task_status().status, JobStatus::Running);
    }

    #[tokio::test]
    async fn test_abort_without_job_is_a_no_op() {
        let ep = endpoint(&seeded(0), 1, 4);
        let bytes = ep.handle(Opcode::AbortJob, vec![]).await.unwrap();
        let stopped: bool = deserialize_message(&bytes).unwrap();
        assert!(!stopped);
        assert_eq!(ep.task_status().status, JobStatus::Idle);
    }

    #[tokio::test]
    async fn test_session_token_reaches_the_store() {
        let ep = endpoint(&seeded(0), 1, 4);
        let mut request = session_request();
        request.session_token = Some(SecretString::new("sts-token"));
        ep.open_session(request).await.unwrap();
        ep.start_job(JobKind::Recovery).unwrap();

        let job = ep.current_job().unwrap();
        let creds = job.storage().store.resolve_credentials().await.unwrap();
        assert_eq!(
            creds.session_token.as_ref().map(SecretString::expose),
            Some("sts-token")
        );
    }
}
