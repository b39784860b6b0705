//! Request/response RPC over [`FramedConnection`]s.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use crate::error::{Result, TransportError};
use crate::message::{deserialize_message, serialize_message};
use crate::metrics::{RpcCounters, RpcStats};
use crate::protocol::{Frame, Opcode};
use crate::tcp::FramedConnection;

/// Configuration for RPC client.
#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    /// Response timeout in milliseconds (default: 5000).
    pub response_timeout_ms: u64,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: 5000,
        }
    }
}

/// Trait for handling incoming RPC requests.
///
/// An `Err` is sent back to the caller as an error-flagged response carrying
/// the error's `Display` text.
#[async_trait]
pub trait RpcHandler: Send + Sync + 'static {
    /// Error type returned by the handler.
    type Error: Display + Send;

    /// Handle a request and return the response payload bytes.
    async fn handle(
        &self,
        opcode: Opcode,
        payload: Vec<u8>,
    ) -> std::result::Result<Vec<u8>, Self::Error>;
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Frame>>>>;

/// Client end of one worker connection.
///
/// Calls may overlap; a background reader routes each response to its
/// caller by request id.
pub struct RpcClient {
    conn: Arc<FramedConnection>,
    config: RpcClientConfig,
    next_id: AtomicU64,
    pending: PendingMap,
    counters: Arc<RpcCounters>,
    reader_handle: tokio::task::JoinHandle<()>,
}

impl RpcClient {
    /// Wraps `conn` and starts the response reader.
    pub fn new(conn: FramedConnection, config: RpcClientConfig) -> Self {
        let conn = Arc::new(conn);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let counters = Arc::new(RpcCounters::default());
        let reader_conn = conn.clone();
        let reader_pending = pending.clone();
        let reader_counters = counters.clone();
        let handle = tokio::spawn(async move {
            loop {
                match reader_conn.recv().await {
                    Ok(Some(frame)) => {
                        reader_counters.received(&frame);
                        let request_id = frame.request_id();
                        if let Some(tx) = reader_pending.lock().await.remove(&request_id) {
                            let _ = tx.send(frame);
                        } else {
                            debug!(request_id, "late response dropped");
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        debug!(error = %e, peer = reader_conn.peer_addr(), "response reader stopping");
                        break;
                    }
                }
            }
            // Dropping the senders wakes every outstanding caller with a reset.
            reader_pending.lock().await.clear();
        });
        Self {
            conn,
            config,
            next_id: AtomicU64::new(1),
            pending,
            counters,
            reader_handle: handle,
        }
    }

    /// Sends a request and waits for its response.
    ///
    /// [`TransportError::SendFailed`] means the worker never saw the request;
    /// a timeout or reset after that point leaves it unknown whether the
    /// worker handled it.
    pub async fn call(&self, opcode: Opcode, payload: Vec<u8>) -> Result<Frame> {
        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = Frame::new(opcode, request_id, payload);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id, tx);
        if let Err(e) = self.conn.send(&frame).await {
            self.pending.lock().await.remove(&request_id);
            self.counters.failure();
            return Err(match e {
                TransportError::IoError(io) => TransportError::SendFailed(io),
                other => other,
            });
        }
        self.counters.sent(&frame);

        let timeout = Duration::from_millis(self.config.response_timeout_ms);
        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                self.counters.failure();
                return Err(TransportError::ConnectionReset);
            }
            Err(_) => {
                self.pending.lock().await.remove(&request_id);
                self.counters.timeout();
                return Err(TransportError::RequestTimeout {
                    request_id,
                    timeout_ms: self.config.response_timeout_ms,
                });
            }
        };

        if response.is_error() {
            self.counters.failure();
            return Err(TransportError::Remote {
                message: String::from_utf8_lossy(&response.payload).into_owned(),
            });
        }
        Ok(response)
    }

    /// Serializes `request`, calls `opcode` and decodes the typed reply.
    pub async fn call_message<Req, Resp>(&self, opcode: Opcode, request: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let payload = serialize_message(request)?;
        let response = self.call(opcode, payload).await?;
        deserialize_message(&response.payload)
    }

    /// Address of the connected peer.
    pub fn peer_addr(&self) -> &str {
        self.conn.peer_addr()
    }

    /// Frames and failures seen by this client.
    pub fn stats(&self) -> RpcStats {
        self.counters.stats()
    }

    /// Closes the connection and stops the reader.
    pub async fn shutdown(self) {
        if let Err(e) = self.conn.close().await {
            debug!(error = %e, "error closing RPC connection");
        }
        self.reader_handle.abort();
    }
}

/// Accept loop dispatching requests to a handler.
pub struct RpcServer<H: RpcHandler> {
    handler: Arc<H>,
    counters: Arc<RpcCounters>,
}

impl<H: RpcHandler> RpcServer<H> {
    /// Creates a server dispatching to `handler`.
    pub fn new(handler: Arc<H>) -> Self {
        Self {
            handler,
            counters: Arc::new(RpcCounters::default()),
        }
    }

    /// Frames and handler errors across every connection.
    pub fn stats(&self) -> RpcStats {
        self.counters.stats()
    }

    /// Accepts connections forever, one task per connection.
    ///
    /// Frames on one connection are handled in arrival order; a handler that
    /// blocks stalls only its own connection.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        loop {
            let (stream, peer_addr) = listener.accept().await?;
            let conn = match FramedConnection::from_stream(stream) {
                Ok(c) => c,
                Err(e) => {
                    warn!(peer = %peer_addr, error = %e, "dropping connection");
                    continue;
                }
            };
            debug!(peer = %peer_addr, "accepted connection");
            let handler = self.handler.clone();
            let counters = self.counters.clone();
            tokio::spawn(async move {
                serve_connection(&conn, handler.as_ref(), &counters).await;
                debug!(peer = %peer_addr, "connection closed");
            });
        }
    }
}

async fn serve_connection<H: RpcHandler>(
    conn: &FramedConnection,
    handler: &H,
    counters: &RpcCounters,
) {
    loop {
        let mut frame = match conn.recv().await {
            Ok(Some(f)) => f,
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "connection read failed");
                break;
            }
        };
        counters.received(&frame);
        let payload = std::mem::take(&mut frame.payload);
        let response = match handler.handle(frame.opcode(), payload).await {
            Ok(payload) => frame.make_response(payload),
            Err(e) => {
                counters.failure();
                warn!(opcode = ?frame.opcode(), error = %e, "handler error");
                frame.make_error_response(&e.to_string())
            }
        };
        if let Err(e) = conn.send(&response).await {
            warn!(error = %e, "failed to send response");
            break;
        }
        counters.sent(&response);
    }
}
