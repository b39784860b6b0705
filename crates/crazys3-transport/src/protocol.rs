//! Wire protocol for coordinator/worker RPC.
//!
//! Every message is a frame: a fixed 24-byte big-endian header followed by
//! an opaque payload (bincode-encoded by the layers above).
//!
//! ```text
//! magic:4 | version:1 | flags:1 | opcode:2 | request_id:8 | payload_length:4 | checksum:4
//! ```
//!
//! The checksum is the CRC32 of the payload.

use crate::error::{Result, TransportError};

/// Frame header size in bytes.
pub const FRAME_HEADER_SIZE: usize = 24;

/// Protocol magic number for frame validation.
pub const MAGIC: u32 = 0xC5A3_0001;

/// Protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Largest payload a peer will accept (64 MiB).
pub const MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;

/// RPC methods understood by a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    /// Liveness probe; the payload is echoed back.
    Heartbeat = 0x0001,
    /// Install storage credentials and region (HandleS3Info).
    SessionInfo = 0x0101,
    /// Arm the pool for a migration job.
    StartMigration = 0x0111,
    /// Arm the pool for a restoration job.
    StartRestoration = 0x0112,
    /// Arm the pool for a recovery job.
    StartRecovery = 0x0113,
    /// Batch of migration requests.
    SubmitMigration = 0x0121,
    /// Batch of restoration requests.
    SubmitRestoration = 0x0122,
    /// Batch of recovery requests.
    SubmitRecovery = 0x0123,
    /// Completion poll (HandleTaskStatus).
    TaskStatus = 0x0131,
    /// Stop the running job and release its executors.
    AbortJob = 0x0141,
}

impl Opcode {
    /// Raw wire value.
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

impl TryFrom<u16> for Opcode {
    type Error = TransportError;

    fn try_from(value: u16) -> Result<Self> {
        match value {
            0x0001 => Ok(Opcode::Heartbeat),
            0x0101 => Ok(Opcode::SessionInfo),
            0x0111 => Ok(Opcode::StartMigration),
            0x0112 => Ok(Opcode::StartRestoration),
            0x0113 => Ok(Opcode::StartRecovery),
            0x0121 => Ok(Opcode::SubmitMigration),
            0x0122 => Ok(Opcode::SubmitRestoration),
            0x0123 => Ok(Opcode::SubmitRecovery),
            0x0131 => Ok(Opcode::TaskStatus),
            0x0141 => Ok(Opcode::AbortJob),
            other => Err(TransportError::UnknownOpcode(other)),
        }
    }
}

/// Frame flags for protocol control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameFlags(u8);

impl FrameFlags {
    /// Frame answers an earlier request.
    pub const RESPONSE: FrameFlags = FrameFlags(0x08);
    /// Response payload is a UTF-8 error message instead of a reply.
    pub const ERROR: FrameFlags = FrameFlags(0x10);

    /// No flags set.
    pub fn empty() -> Self {
        FrameFlags(0)
    }

    /// Whether every bit of `flag` is set.
    pub fn contains(&self, flag: FrameFlags) -> bool {
        (self.0 & flag.0) == flag.0
    }

    /// Returns a copy with `flag` added.
    pub fn with(mut self, flag: FrameFlags) -> Self {
        self.0 |= flag.0;
        self
    }

    /// Raw byte representation.
    pub fn bits(&self) -> u8 {
        self.0
    }

    /// Builds flags from the raw byte.
    pub fn from_bits(bits: u8) -> Self {
        FrameFlags(bits)
    }
}

/// Frame header containing metadata about the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Protocol magic number.
    pub magic: u32,
    /// Protocol version.
    pub version: u8,
    /// Control flags.
    pub flags: FrameFlags,
    /// Operation code.
    pub opcode: Opcode,
    /// Request ID used to match responses to calls.
    pub request_id: u64,
    /// Payload length in bytes.
    pub payload_length: u32,
    /// CRC32 of the payload.
    pub checksum: u32,
}

impl FrameHeader {
    /// Serializes the header into its fixed-size wire form.
    pub fn encode(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut buf = [0u8; FRAME_HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.magic.to_be_bytes());
        buf[4] = self.version;
        buf[5] = self.flags.bits();
        buf[6..8].copy_from_slice(&self.opcode.as_u16().to_be_bytes());
        buf[8..16].copy_from_slice(&self.request_id.to_be_bytes());
        buf[16..20].copy_from_slice(&self.payload_length.to_be_bytes());
        buf[20..24].copy_from_slice(&self.checksum.to_be_bytes());
        buf
    }

    /// Parses and validates a header from its wire form.
    pub fn decode(buf: &[u8; FRAME_HEADER_SIZE]) -> Result<Self> {
        let magic = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if magic != MAGIC {
            return Err(TransportError::InvalidMagic {
                expected: MAGIC,
                got: magic,
            });
        }
        let version = buf[4];
        if version != PROTOCOL_VERSION {
            return Err(TransportError::VersionMismatch {
                expected: PROTOCOL_VERSION,
                got: version,
            });
        }
        let opcode = Opcode::try_from(u16::from_be_bytes([buf[6], buf[7]]))?;
        let mut request_id = [0u8; 8];
        request_id.copy_from_slice(&buf[8..16]);
        Ok(Self {
            magic,
            version,
            flags: FrameFlags::from_bits(buf[5]),
            opcode,
            request_id: u64::from_be_bytes(request_id),
            payload_length: u32::from_be_bytes([buf[16], buf[17], buf[18], buf[19]]),
            checksum: u32::from_be_bytes([buf[20], buf[21], buf[22], buf[23]]),
        })
    }
}

/// A single frame in the RPC protocol.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Frame header.
    pub header: FrameHeader,
    /// Payload data.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Creates a request frame with the checksum computed over `payload`.
    pub fn new(opcode: Opcode, request_id: u64, payload: Vec<u8>) -> Self {
        let header = FrameHeader {
            magic: MAGIC,
            version: PROTOCOL_VERSION,
            flags: FrameFlags::empty(),
            opcode,
            request_id,
            payload_length: payload.len() as u32,
            checksum: crc32fast::hash(&payload),
        };
        Self { header, payload }
    }

    /// Builds the response frame answering this request.
    pub fn make_response(&self, payload: Vec<u8>) -> Frame {
        let mut frame = Frame::new(self.header.opcode, self.header.request_id, payload);
        frame.header.flags = FrameFlags::RESPONSE;
        frame
    }

    /// Builds an error response carrying `message`.
    pub fn make_error_response(&self, message: &str) -> Frame {
        let mut frame = Frame::new(
            self.header.opcode,
            self.header.request_id,
            message.as_bytes().to_vec(),
        );
        frame.header.flags = FrameFlags::RESPONSE.with(FrameFlags::ERROR);
        frame
    }

    /// Operation code.
    pub fn opcode(&self) -> Opcode {
        self.header.opcode
    }

    /// Request ID.
    pub fn request_id(&self) -> u64 {
        self.header.request_id
    }

    /// Whether this frame answers a request.
    pub fn is_response(&self) -> bool {
        self.header.flags.contains(FrameFlags::RESPONSE)
    }

    /// Whether this frame is an error response.
    pub fn is_error(&self) -> bool {
        self.header.flags.contains(FrameFlags::ERROR)
    }

    /// Serializes header and payload into one buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + self.payload.len());
        buf.extend_from_slice(&self.header.encode());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Parses a complete frame from a buffer.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Err(TransportError::SerializationError(format!(
                "frame shorter than header: {} bytes",
                buf.len()
            )));
        }
        let mut header_buf = [0u8; FRAME_HEADER_SIZE];
        header_buf.copy_from_slice(&buf[..FRAME_HEADER_SIZE]);
        let header = FrameHeader::decode(&header_buf)?;
        let end = FRAME_HEADER_SIZE + header.payload_length as usize;
        if buf.len() < end {
            return Err(TransportError::SerializationError(format!(
                "truncated payload: expected {} bytes, got {}",
                header.payload_length,
                buf.len() - FRAME_HEADER_SIZE
            )));
        }
        let frame = Frame {
            header,
            payload: buf[FRAME_HEADER_SIZE..end].to_vec(),
        };
        frame.validate()?;
        Ok(frame)
    }

    /// Checks payload length and checksum against the header.
    pub fn validate(&self) -> Result<()> {
        if self.header.payload_length > MAX_PAYLOAD_SIZE {
            return Err(TransportError::PayloadTooLarge {
                size: self.header.payload_length,
                max_size: MAX_PAYLOAD_SIZE,
            });
        }
        let computed = crc32fast::hash(&self.payload);
        if computed != self.header.checksum {
            return Err(TransportError::ChecksumMismatch {
                expected: self.header.checksum,
                computed,
            });
        }
        Ok(())
    }
}
