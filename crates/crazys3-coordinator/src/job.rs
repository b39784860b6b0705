//! Job driver: session setup, enumeration, dispatch, shutdown and polling.

use std::sync::Arc;

use crazys3_storage::{CredentialSource, RestoreTier, StorageConnector};
use crazys3_transport::{RpcStats, TransportError};
use crazys3_worker::{
    ExecutionRequest, JobKind, MigrationTask, RecoveryTask, RestorationTask, SessionRequest,
    TaskStatus, WorkItem,
};
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::batch::BatchBuffer;
use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, Result};
use crate::handle::WorkerHandle;
use crate::partition::partition;
use crate::poll::{CompletionPoller, PollOutcome};
use crate::region;
use crate::stream::WorkItemStream;

/// Kind-specific job parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobParams {
    /// Copy every object to `dest_bucket` under the same key.
    Migration {
        /// Destination bucket.
        dest_bucket: String,
    },
    /// Request restores of archived objects.
    Restoration {
        /// Restore lifetime in days.
        days: i32,
        /// Retrieval tier.
        tier: RestoreTier,
    },
    /// Re-write archived objects in place as STANDARD.
    Recovery,
}

impl JobParams {
    /// The job kind these parameters describe.
    pub fn kind(&self) -> JobKind {
        match self {
            JobParams::Migration { .. } => JobKind::Migration,
            JobParams::Restoration { .. } => JobKind::Restoration,
            JobParams::Recovery => JobKind::Recovery,
        }
    }

    fn request_for(&self, item: WorkItem) -> ExecutionRequest {
        match self {
            JobParams::Migration { dest_bucket } => ExecutionRequest::Migration(MigrationTask {
                dest_bucket: dest_bucket.clone(),
                dest_key: item.key.clone(),
                item,
            }),
            JobParams::Restoration { days, tier } => {
                ExecutionRequest::Restoration(RestorationTask {
                    item,
                    days: *days,
                    tier: *tier,
                })
            }
            JobParams::Recovery => ExecutionRequest::Recovery(RecoveryTask { item }),
        }
    }
}

/// One job to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    /// Kind and kind-specific parameters.
    pub params: JobParams,
    /// Bucket to enumerate.
    pub source_bucket: String,
    /// Key prefix to enumerate; empty for the whole bucket.
    pub prefix: String,
    /// Credential profile.
    pub profile: String,
}

/// What the coordinator sent to one worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    /// Work items assigned.
    pub items: u64,
    /// Submits triggered by a full buffer.
    pub threshold_flushes: u64,
    /// End-of-enumeration submits.
    pub final_flushes: u64,
    /// Sentinels appended to the final submit.
    pub sentinels: usize,
    /// Threshold batches dropped after the flush policy gave up.
    pub dropped_batches: u64,
    /// Items in dropped batches.
    pub dropped_items: u64,
}

/// Per-worker section of a [`JobReport`].
#[derive(Debug, Clone)]
pub struct WorkerReport {
    /// Worker address.
    pub address: String,
    /// Executors the worker runs.
    pub pool_size: usize,
    /// What was dispatched.
    pub dispatch: DispatchStats,
    /// Last polled status.
    pub status: Option<TaskStatus>,
    /// Frame counters of the worker connection, all jobs included.
    pub rpc: RpcStats,
}

/// Result of [`Coordinator::run_job`].
#[derive(Debug, Clone)]
pub struct JobReport {
    /// Job id used in logs.
    pub job_id: Uuid,
    /// Job kind.
    pub kind: JobKind,
    /// Region the job ran in.
    pub region: String,
    /// Objects listed.
    pub enumerated: u64,
    /// Objects skipped as malformed.
    pub skipped: u64,
    /// How completion polling ended.
    pub outcome: PollOutcome,
    /// One entry per worker, in configuration order.
    pub workers: Vec<WorkerReport>,
}

impl JobReport {
    /// True when every worker finished.
    pub fn is_done(&self) -> bool {
        self.outcome == PollOutcome::Done
    }

    /// Sum of objects processed successfully across workers.
    pub fn processed(&self) -> u64 {
        self.workers
            .iter()
            .filter_map(|w| w.status.map(|s| s.processed))
            .sum()
    }

    /// Sum of failed objects across workers.
    pub fn failed(&self) -> u64 {
        self.workers
            .iter()
            .filter_map(|w| w.status.map(|s| s.failed))
            .sum()
    }
}

/// Drives jobs across a fixed set of workers.
pub struct Coordinator {
    workers: Vec<WorkerHandle>,
    connector: Arc<dyn StorageConnector>,
    config: CoordinatorConfig,
    poller: CompletionPoller,
    cancel: Mutex<CancellationToken>,
}

impl Coordinator {
    /// Builds a coordinator over already-connected workers.
    pub fn new(
        workers: Vec<WorkerHandle>,
        connector: Arc<dyn StorageConnector>,
        config: CoordinatorConfig,
    ) -> Result<Self> {
        if workers.is_empty() {
            return Err(CoordinatorError::NoWorkers);
        }
        let poller =
            CompletionPoller::new(config.poll_interval()).with_deadline(config.poll_timeout());
        Ok(Self {
            workers,
            connector,
            config,
            poller,
            cancel: Mutex::new(CancellationToken::new()),
        })
    }

    /// Connects to every worker listed in `config`.
    pub async fn connect(
        config: CoordinatorConfig,
        connector: Arc<dyn StorageConnector>,
    ) -> Result<Self> {
        if config.workers.is_empty() {
            return Err(CoordinatorError::NoWorkers);
        }
        let mut workers = Vec::with_capacity(config.workers.len());
        for address in &config.workers {
            let handle =
                WorkerHandle::connect(address, config.connect_timeout(), config.rpc_timeout())
                    .await
                    .map_err(|e| CoordinatorError::transport(address, e))?;
            workers.push(handle);
        }
        Self::new(workers, connector, config)
    }

    /// Replaces the completion poller.
    pub fn with_poller(mut self, poller: CompletionPoller) -> Self {
        self.poller = poller;
        self
    }

    /// Token that stops completion polling of the current or next job.
    /// Once a job has been cancelled, later jobs get a fresh token.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.lock().clone()
    }

    /// Connected workers, in configuration order.
    pub fn workers(&self) -> &[WorkerHandle] {
        &self.workers
    }

    /// Runs one job to completion (or until polling gives up).
    ///
    /// When the job fails after workers were armed, those workers are
    /// aborted so that they accept the next job.
    pub async fn run_job(&self, spec: &JobSpec) -> Result<JobReport> {
        let cancel = self.cancel_token();
        let result = self.drive(spec, &cancel).await;
        let mut token = self.cancel.lock();
        if token.is_cancelled() {
            *token = CancellationToken::new();
        }
        result
    }

    async fn drive(&self, spec: &JobSpec, cancel: &CancellationToken) -> Result<JobReport> {
        let kind = spec.params.kind();
        let job_id = Uuid::new_v4();
        info!(
            %job_id,
            %kind,
            bucket = %spec.source_bucket,
            prefix = %spec.prefix,
            workers = self.workers.len(),
            "job starting"
        );

        let credentials = CredentialSource::Profile(spec.profile.clone());
        let plan = region::reconcile(
            self.connector.as_ref(),
            &credentials,
            &self.config.default_region,
            spec,
        )
        .await?;
        let resolved = plan.store.resolve_credentials().await?;

        let session = SessionRequest {
            profile: spec.profile.clone(),
            region: plan.region.clone(),
            access_key: resolved.access_key.clone(),
            secret_key: resolved.secret_key.clone(),
            session_token: resolved.session_token.clone(),
        };
        let pool_sizes = self.open_sessions(&session).await?;
        for (index, worker) in self.workers.iter().enumerate() {
            if let Err(e) = worker.start_job(kind).await {
                // A worker that answered with an error never armed this job.
                let armed = match e {
                    TransportError::Remote { .. } => index,
                    _ => index + 1,
                };
                self.abort_workers(job_id, &self.workers[..armed]).await;
                return Err(CoordinatorError::transport(worker.address(), e));
            }
        }
        info!(%job_id, region = %plan.region, "workers armed");

        let n = self.workers.len();
        let mut buffers: Vec<BatchBuffer> = (0..n)
            .map(|_| BatchBuffer::new(self.config.batch_size))
            .collect();
        let mut stats = vec![DispatchStats::default(); n];
        let mut enumerated = 0u64;
        let mut skipped = 0u64;

        let mut stream = WorkItemStream::new(plan.store.clone(), &spec.source_bucket, &spec.prefix);
        loop {
            let item = match stream.next().await {
                Ok(Some(item)) => item,
                Ok(None) => break,
                Err(e) => {
                    error!(%job_id, error = %e, "enumeration failed");
                    self.abort_workers(job_id, &self.workers).await;
                    return Err(e.into());
                }
            };
            enumerated += 1;
            if item.key.is_empty() {
                warn!(sequence_id = item.sequence_id, bucket = %item.bucket, "skipping object with empty key");
                skipped += 1;
                continue;
            }
            let index = partition(item.sequence_id, n);
            stats[index].items += 1;
            if let Some(batch) = buffers[index].push(spec.params.request_for(item)) {
                stats[index].threshold_flushes += 1;
                let worker = &self.workers[index];
                if self.config.flush_policy.flush(worker, kind, &batch).await.is_err() {
                    stats[index].dropped_batches += 1;
                    stats[index].dropped_items += batch.len() as u64;
                }
            }
        }
        info!(%job_id, enumerated, skipped, pages = stream.pages(), "enumeration finished");

        let mut undelivered = None;
        for (index, worker) in self.workers.iter().enumerate() {
            let mut batch = buffers[index].take();
            batch.extend(std::iter::repeat(ExecutionRequest::Sentinel).take(pool_sizes[index]));
            stats[index].final_flushes += 1;
            stats[index].sentinels = pool_sizes[index];
            if let Err(source) = self.config.flush_policy.flush(worker, kind, &batch).await {
                error!(%job_id, worker = %worker.address(), "sentinels not delivered, aborting worker");
                self.abort_workers(job_id, std::slice::from_ref(worker)).await;
                undelivered.get_or_insert(CoordinatorError::SentinelDelivery {
                    worker: worker.address().to_string(),
                    source,
                });
            }
        }
        if let Some(e) = undelivered {
            return Err(e);
        }

        let poll = self.poller.poll(&self.workers, cancel).await?;
        match &poll.outcome {
            PollOutcome::Done => info!(%job_id, %kind, "job finished"),
            PollOutcome::TimedOut { unfinished } => {
                warn!(%job_id, unfinished = ?unfinished, "gave up waiting for workers")
            }
            PollOutcome::Cancelled => warn!(%job_id, "polling cancelled"),
        }

        let workers = self
            .workers
            .iter()
            .zip(stats)
            .zip(pool_sizes)
            .zip(poll.statuses)
            .map(|(((worker, dispatch), pool_size), status)| WorkerReport {
                address: worker.address().to_string(),
                pool_size,
                dispatch,
                status,
                rpc: worker.rpc_stats(),
            })
            .collect();
        Ok(JobReport {
            job_id,
            kind,
            region: plan.region,
            enumerated,
            skipped,
            outcome: poll.outcome,
            workers,
        })
    }

    /// Best-effort abort; failures are logged and the caller's error wins.
    async fn abort_workers(&self, job_id: Uuid, workers: &[WorkerHandle]) {
        for worker in workers {
            match worker.abort_job().await {
                Ok(true) => warn!(%job_id, worker = %worker.address(), "worker job aborted"),
                Ok(false) => debug!(%job_id, worker = %worker.address(), "worker had no job to abort"),
                Err(e) => {
                    warn!(%job_id, worker = %worker.address(), error = %e, "abort not delivered")
                }
            }
        }
    }

    async fn open_sessions(&self, session: &SessionRequest) -> Result<Vec<usize>> {
        let mut pool_sizes = Vec::with_capacity(self.workers.len());
        for worker in &self.workers {
            let ack = worker
                .open_session(session)
                .await
                .map_err(|e| CoordinatorError::transport(worker.address(), e))?;
            if !ack.accepted {
                return Err(CoordinatorError::SessionRejected {
                    worker: worker.address().to_string(),
                });
            }
            pool_sizes.push(ack.pool_size);
        }
        Ok(pool_sizes)
    }

    /// Closes every worker connection.
    pub async fn shutdown(self) {
        for worker in self.workers {
            worker.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crazys3_storage::{MemoryBackend, MemoryConnector};

    #[test]
    fn test_request_for_migration_keeps_key() {
        let params = JobParams::Migration {
            dest_bucket: "dst".to_string(),
        };
        let item = WorkItem {
            sequence_id: 3,
            bucket: "src".to_string(),
            key: "a/b".to_string(),
            size: 1,
            storage_class: Default::default(),
        };
        match params.request_for(item) {
            ExecutionRequest::Migration(task) => {
                assert_eq!(task.dest_bucket, "dst");
                assert_eq!(task.dest_key, "a/b");
                assert_eq!(task.item.sequence_id, 3);
            }
            other => panic!("unexpected request {other:?}"),
        }
        assert_eq!(JobParams::Recovery.kind(), JobKind::Recovery);
    }

    #[test]
    fn test_new_rejects_empty_worker_list() {
        let connector = Arc::new(MemoryConnector::new(MemoryBackend::new()));
        let result = Coordinator::new(Vec::new(), connector, CoordinatorConfig::default());
        assert!(matches!(result, Err(CoordinatorError::NoWorkers)));
    }
}
