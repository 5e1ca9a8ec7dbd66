//! Serialization and deserialization for the Parlor wire format.
//!
//! The server speaks JSON text frames; every frame is one tagged
//! [`ServerEvent`].

use crate::event::ServerEvent;

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Encodes a [`ServerEvent`] into its JSON frame text.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the event cannot be
/// serialized.
pub fn encode_event(event: &ServerEvent) -> Result<String, CodecError> {
    serde_json::to_string(event).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a [`ServerEvent`] from JSON frame text.
///
/// # Errors
///
/// Returns `CodecError::Serialization` for malformed frames or
/// unknown event names.
pub fn decode_event(frame: &str) -> Result<ServerEvent, CodecError> {
    serde_json::from_str(frame).map_err(|e| CodecError::Serialization(e.to_string()))
}
