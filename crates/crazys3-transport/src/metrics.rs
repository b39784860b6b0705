//! Frame counters kept per RPC client and per RPC server.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::protocol::{Frame, FRAME_HEADER_SIZE};

/// Point-in-time copy of [`RpcCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RpcStats {
    /// Frames written.
    pub frames_sent: u64,
    /// Frames read.
    pub frames_received: u64,
    /// Wire bytes written, headers included.
    pub bytes_sent: u64,
    /// Wire bytes read, headers included.
    pub bytes_received: u64,
    /// Calls answered with an error frame (client) or handler errors (server).
    pub failures: u64,
    /// Calls that got no answer in time.
    pub timeouts: u64,
}

#[derive(Debug, Default)]
pub(crate) struct RpcCounters {
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
}

fn wire_len(frame: &Frame) -> u64 {
    (FRAME_HEADER_SIZE + frame.payload.len()) as u64
}

impl RpcCounters {
    pub(crate) fn sent(&self, frame: &Frame) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(wire_len(frame), Ordering::Relaxed);
    }

    pub(crate) fn received(&self, frame: &Frame) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(wire_len(frame), Ordering::Relaxed);
    }

    pub(crate) fn failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stats(&self) -> RpcStats {
        RpcStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Opcode;

    #[test]
    fn test_bytes_include_header() {
        let counters = RpcCounters::default();
        counters.sent(&Frame::new(Opcode::SubmitRecovery, 1, vec![0; 100]));
        counters.received(&Frame::new(Opcode::SubmitRecovery, 1, vec![]));
        counters.timeout();

        let stats = counters.stats();
        assert_eq!(stats.frames_sent, 1);
        assert_eq!(stats.bytes_sent, 124);
        assert_eq!(stats.bytes_received, 24);
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.failures, 0);
    }
}
