//! Error types for the transport subsystem.

use thiserror::Error;

/// Errors raised while framing, sending or receiving RPC traffic.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer actively refused the connection.
    #[error("connection refused to {addr}")]
    ConnectionRefused {
        /// Address that refused the connection.
        addr: String,
    },

    /// Connecting did not finish within the configured timeout.
    #[error("connection timeout after {timeout_ms}ms to {addr}")]
    ConnectionTimeout {
        /// Address being dialed.
        addr: String,
        /// Timeout that elapsed.
        timeout_ms: u64,
    },

    /// Writing the request frame failed; the peer never handled it.
    #[error("request not sent: {0}")]
    SendFailed(#[source] std::io::Error),

    /// The connection dropped while a response was outstanding.
    #[error("connection reset by peer")]
    ConnectionReset,

    /// Header carried an unexpected magic number.
    #[error("invalid magic number: expected 0x{expected:08X}, got 0x{got:08X}")]
    InvalidMagic {
        /// Magic number this build speaks.
        expected: u32,
        /// Magic number found on the wire.
        got: u32,
    },

    /// Header carried a protocol version this build does not speak.
    #[error("protocol version mismatch: expected {expected}, got {got}")]
    VersionMismatch {
        /// Version this build speaks.
        expected: u8,
        /// Version found on the wire.
        got: u8,
    },

    /// Payload checksum did not match the header.
    #[error("checksum mismatch: expected 0x{expected:08X}, computed 0x{computed:08X}")]
    ChecksumMismatch {
        /// Checksum carried in the header.
        expected: u32,
        /// Checksum computed over the received payload.
        computed: u32,
    },

    /// Payload exceeds [`crate::protocol::MAX_PAYLOAD_SIZE`].
    #[error("payload too large: {size} bytes (max {max_size})")]
    PayloadTooLarge {
        /// Announced payload size.
        size: u32,
        /// Largest accepted payload.
        max_size: u32,
    },

    /// No response arrived within the client's response timeout.
    #[error("request {request_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// Request that timed out.
        request_id: u64,
        /// Timeout that elapsed.
        timeout_ms: u64,
    },

    /// Opcode not known to this build.
    #[error("unknown opcode: 0x{0:04X}")]
    UnknownOpcode(u16),

    /// The remote handler rejected the request.
    #[error("remote error: {message}")]
    Remote {
        /// Error text produced by the remote handler.
        message: String,
    },

    /// Payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Underlying socket error.
    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
