//! Coordinator-side connection to one worker.

use std::time::Duration;

use crazys3_transport::message::serialize_message;
use crazys3_transport::{dial, Opcode, Result, RpcClient, RpcClientConfig, RpcStats};
use crazys3_worker::{ExecutionRequest, JobKind, SessionAck, SessionRequest, TaskStatus};
use tracing::{debug, info};

/// An open RPC connection to a worker.
pub struct WorkerHandle {
    address: String,
    client: RpcClient,
}

impl WorkerHandle {
    /// Connects to the worker at `address`.
    pub async fn connect(
        address: &str,
        connect_timeout: Duration,
        rpc_timeout: Duration,
    ) -> Result<Self> {
        let conn = dial(address, connect_timeout).await?;
        let client = RpcClient::new(
            conn,
            RpcClientConfig {
                response_timeout_ms: rpc_timeout.as_millis() as u64,
            },
        );
        info!(worker = address, "connected to worker");
        Ok(Self {
            address: address.to_string(),
            client,
        })
    }

    /// The configured worker address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Installs a storage session on the worker.
    pub async fn open_session(&self, request: &SessionRequest) -> Result<SessionAck> {
        self.client.call_message(Opcode::SessionInfo, request).await
    }

    /// Arms a job of `kind`.
    pub async fn start_job(&self, kind: JobKind) -> Result<()> {
        self.client.call_message(kind.start_opcode(), &()).await
    }

    /// Submits one batch for `kind`.
    pub async fn submit(&self, kind: JobKind, batch: &[ExecutionRequest]) -> Result<()> {
        let payload = serialize_message(&batch)?;
        debug!(worker = %self.address, entries = batch.len(), bytes = payload.len(), "sending batch");
        self.client.call(kind.submit_opcode(), payload).await?;
        Ok(())
    }

    /// Polls the worker's job status.
    pub async fn task_status(&self) -> Result<TaskStatus> {
        self.client.call_message(Opcode::TaskStatus, &()).await
    }

    /// Stops the worker's current job and waits until its executors exit.
    /// Returns false when the worker had no job to stop.
    pub async fn abort_job(&self) -> Result<bool> {
        self.client.call_message(Opcode::AbortJob, &()).await
    }

    /// Frame counters of this connection.
    pub fn rpc_stats(&self) -> RpcStats {
        self.client.stats()
    }

    /// Liveness check; the worker echoes the payload.
    pub async fn heartbeat(&self) -> Result<()> {
        self.client.call(Opcode::Heartbeat, Vec::new()).await?;
        Ok(())
    }

    /// Closes the connection.
    pub async fn close(self) {
        self.client.shutdown().await;
        info!(worker = %self.address, "closed worker connection");
    }
}
