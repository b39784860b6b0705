//! Payload serialization for RPC messages.
//!
//! Request and reply bodies are serde types owned by the crates that define
//! the RPC contract; this module only fixes the wire encoding (bincode).

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, TransportError};

/// Serialize any serde-compatible message to bytes using bincode.
pub fn serialize_message<T: Serialize + ?Sized>(msg: &T) -> Result<Vec<u8>> {
    bincode::serialize(msg).map_err(|e| TransportError::SerializationError(e.to_string()))
}

/// Deserialize bytes to a message using bincode.
pub fn deserialize_message<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    bincode::deserialize(data).map_err(|e| TransportError::SerializationError(e.to_string()))
}
