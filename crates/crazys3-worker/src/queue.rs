//! Bounded multi-producer multi-consumer work queue.

use async_channel::{Receiver, Sender};

use crate::error::{Result, WorkerError};
use crate::rpc::ExecutionRequest;

/// Default queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// FIFO of [`ExecutionRequest`]s shared by the endpoint and executors.
///
/// `push` waits while the queue is full and `pop` waits while it is empty.
#[derive(Debug, Clone)]
pub struct WorkQueue {
    tx: Sender<ExecutionRequest>,
    rx: Receiver<ExecutionRequest>,
}

impl WorkQueue {
    /// Creates a queue holding at most `capacity` requests (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = async_channel::bounded(capacity.max(1));
        Self { tx, rx }
    }

    /// Appends a request, waiting for room.
    pub async fn push(&self, request: ExecutionRequest) -> Result<()> {
        self.tx.send(request).await.map_err(|_| WorkerError::QueueClosed)
    }

    /// Removes the oldest request, waiting until one is available.
    /// Returns `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<ExecutionRequest> {
        self.rx.recv().await.ok()
    }

    /// Number of queued requests.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Maximum number of queued requests.
    pub fn capacity(&self) -> usize {
        self.rx.capacity().unwrap_or(usize::MAX)
    }

    /// Closes the queue; pending pops drain what is left, then return `None`.
    pub fn close(&self) {
        self.tx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{RecoveryTask, WorkItem};
    use crazys3_storage::StorageClass;
    use std::time::Duration;

    fn recovery(seq: u64) -> ExecutionRequest {
        ExecutionRequest::Recovery(RecoveryTask {
            item: WorkItem {
                sequence_id: seq,
                bucket: "b".to_string(),
                key: format!("k{seq}"),
                size: 1,
                storage_class: StorageClass::Glacier,
            },
        })
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = WorkQueue::new(8);
        for seq in 1..=3 {
            queue.push(recovery(seq)).await.unwrap();
        }
        queue.push(ExecutionRequest::Sentinel).await.unwrap();
        assert_eq!(queue.len(), 4);

        for seq in 1..=3 {
            let got = queue.pop().await.unwrap();
            assert_eq!(got.item().map(|i| i.sequence_id), Some(seq));
        }
        assert!(queue.pop().await.unwrap().is_sentinel());
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_push_waits_when_full() {
        let queue = WorkQueue::new(1);
        queue.push(recovery(1)).await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), queue.push(recovery(2))).await;
        assert!(blocked.is_err());

        queue.pop().await.unwrap();
        tokio::time::timeout(Duration::from_millis(500), queue.push(recovery(3)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(queue.capacity(), 1);
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let queue = WorkQueue::new(4);
        queue.push(recovery(1)).await.unwrap();
        queue.close();
        assert!(queue.push(recovery(2)).await.is_err());
        assert!(queue.pop().await.is_some());
        assert!(queue.pop().await.is_none());
    }
}
