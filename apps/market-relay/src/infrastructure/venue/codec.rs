//! Venue Codec Module
//!
//! Encoding and decoding for the venue's JSON text frames.
//!
//! A frame carries either a single message object or an array of message
//! objects (the venue may batch ticks). Each object is discriminated by its
//! `type` field; unrecognised types are reported separately from malformed
//! JSON so the reader can skip them without treating the frame as corrupt.

use super::messages::VenueMessage;

/// Message types this codec understands.
const KNOWN_TYPES: &[&str] = &[
    "authenticated",
    "symbols",
    "snapshot",
    "heartbeatAck",
    "tick",
    "bar",
    "error",
];

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unknown message type.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// Object without a `type` field.
    #[error("message has no type field")]
    MissingType,

    /// Invalid message format.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

/// JSON codec for the venue stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a JSON text frame into venue messages.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON parsing fails, a message has no or an
    /// unknown `type`, or the frame is neither an object nor an array.
    pub fn decode(&self, text: &str) -> Result<Vec<VenueMessage>, CodecError> {
        let trimmed = text.trim();

        if trimmed.starts_with('[') {
            let raw_array: Vec<serde_json::Value> = serde_json::from_str(trimmed)?;
            raw_array.into_iter().map(Self::decode_value).collect()
        } else if trimmed.starts_with('{') {
            let value: serde_json::Value = serde_json::from_str(trimmed)?;
            Ok(vec![Self::decode_value(value)?])
        } else {
            let preview: String = trimmed.chars().take(50).collect();
            Err(CodecError::InvalidFormat(format!(
                "expected JSON array or object, got: {preview}..."
            )))
        }
    }

    fn decode_value(value: serde_json::Value) -> Result<VenueMessage, CodecError> {
        let msg_type = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or(CodecError::MissingType)?;

        if !KNOWN_TYPES.contains(&msg_type) {
            return Err(CodecError::UnknownMessageType(msg_type.to_string()));
        }

        Ok(serde_json::from_value(value)?)
    }

    /// Encode a value to JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode<T: serde::Serialize>(&self, value: &T) -> Result<String, CodecError> {
        Ok(serde_json::to_string(value)?)
    }
}
