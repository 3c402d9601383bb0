//! Serialization and deserialization for the board wire protocol.
//!
//! Provides encode/decode functions using postcard. WebSocket frames preserve
//! message boundaries, so no length prefix is added.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Deserialization failed or the frame was empty.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

/// Encodes a protocol message into a byte vector using postcard.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the message cannot be serialized.
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(msg).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a protocol message from a byte slice using postcard.
///
/// # Errors
///
/// Returns `CodecError::InvalidFrame` if the input is empty or cannot be
/// deserialized into `T`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    if bytes.is_empty() {
        return Err(CodecError::InvalidFrame("empty frame".into()));
    }
    postcard::from_bytes(bytes).map_err(|e| CodecError::InvalidFrame(e.to_string()))
}
