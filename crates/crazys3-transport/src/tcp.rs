//! Framed TCP connections between coordinator and workers.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use crate::error::{Result, TransportError};
use crate::protocol::{Frame, FrameHeader, FRAME_HEADER_SIZE, MAX_PAYLOAD_SIZE};

/// Dials `addr`, giving up after `timeout`.
pub async fn dial(addr: &str, timeout: Duration) -> Result<FramedConnection> {
    let stream = match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Err(_) => {
            return Err(TransportError::ConnectionTimeout {
                addr: addr.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })
        }
        Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => {
            return Err(TransportError::ConnectionRefused {
                addr: addr.to_string(),
            })
        }
        Ok(result) => result?,
    };
    tracing::debug!(addr, "dialed");
    FramedConnection::from_stream(stream)
}

/// Binds a listener for worker RPC.
pub async fn bind(addr: &str) -> Result<TcpListener> {
    Ok(TcpListener::bind(addr).await?)
}

/// One TCP stream carrying [`Frame`]s.
///
/// Reads and writes lock separate halves, so a reader task and concurrent
/// senders never block each other.
pub struct FramedConnection {
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    peer: String,
}

impl FramedConnection {
    pub(crate) fn from_stream(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?.to_string();
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            peer,
        })
    }

    /// Writes one frame.
    pub async fn send(&self, frame: &Frame) -> Result<()> {
        let bytes = frame.encode();
        let mut writer = self.writer.lock().await;
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Reads the next frame; `None` when the peer closed between frames.
    pub async fn recv(&self) -> Result<Option<Frame>> {
        let mut reader = self.reader.lock().await;
        let mut header = [0u8; FRAME_HEADER_SIZE];
        let mut filled = 0;
        while filled < FRAME_HEADER_SIZE {
            let n = reader.read(&mut header[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
            }
            filled += n;
        }
        let header = FrameHeader::decode(&header)?;
        if header.payload_length > MAX_PAYLOAD_SIZE {
            return Err(TransportError::PayloadTooLarge {
                size: header.payload_length,
                max_size: MAX_PAYLOAD_SIZE,
            });
        }
        let mut payload = vec![0u8; header.payload_length as usize];
        reader.read_exact(&mut payload).await?;
        let frame = Frame { header, payload };
        frame.validate()?;
        Ok(Some(frame))
    }

    /// Shuts down the write half; the peer's next `recv` returns `None`.
    pub async fn close(&self) -> Result<()> {
        self.writer.lock().await.shutdown().await?;
        Ok(())
    }

    /// Remote address.
    pub fn peer_addr(&self) -> &str {
        &self.peer
    }
}
