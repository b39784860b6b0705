//! Per-worker batch buffers.

use crazys3_worker::ExecutionRequest;

/// Default number of requests per submit call.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Accumulates requests for one worker until the threshold is reached.
#[derive(Debug)]
pub struct BatchBuffer {
    threshold: usize,
    pending: Vec<ExecutionRequest>,
}

impl BatchBuffer {
    /// Creates a buffer that fills at `threshold` entries (minimum 1).
    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            threshold,
            pending: Vec::with_capacity(threshold),
        }
    }

    /// Appends `request`. Returns the full batch, leaving the buffer empty,
    /// once it holds `threshold` entries.
    pub fn push(&mut self, request: ExecutionRequest) -> Option<Vec<ExecutionRequest>> {
        self.pending.push(request);
        if self.pending.len() >= self.threshold {
            Some(self.take())
        } else {
            None
        }
    }

    /// Drains whatever is buffered.
    pub fn take(&mut self) -> Vec<ExecutionRequest> {
        std::mem::replace(&mut self.pending, Vec::with_capacity(self.threshold))
    }

    /// Number of buffered requests.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True when nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// The flush threshold.
    pub fn threshold(&self) -> usize {
        self.threshold
    }
}
