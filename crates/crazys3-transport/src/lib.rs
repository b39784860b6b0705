#![warn(missing_docs)]

//! crazys3 transport subsystem: framed binary RPC over TCP between the
//! coordinator and its workers.

pub mod error;
pub mod message;
pub mod metrics;
pub mod protocol;
pub mod retry;
pub mod rpc;
pub mod tcp;

pub use error::{Result, TransportError};
pub use metrics::RpcStats;
pub use protocol::{Frame, Opcode};
pub use retry::{is_retryable, is_unsent, RetryConfig, RetryExecutor, RetryOutcome};
pub use rpc::{RpcClient, RpcClientConfig, RpcHandler, RpcServer};
pub use tcp::{bind, dial, FramedConnection};
