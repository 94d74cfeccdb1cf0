//! Text frame codec
//!
//! Inbound frames are decoded into arbitrary JSON values; outbound payloads
//! are any `Serialize` value encoded as compact JSON text.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Maximum accepted frame length in either direction (1MB)
pub const MAX_FRAME_LENGTH: usize = 1024 * 1024;

/// Number of bytes of a rejected frame kept for diagnostics
pub const RAW_PREVIEW_LENGTH: usize = 256;

// ============================================================================
// Error Types
// ============================================================================

/// Protocol-related errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Frame of {len} bytes exceeds maximum length of {MAX_FRAME_LENGTH} bytes")]
    FrameTooLarge { len: usize },

    #[error("Empty frame")]
    EmptyFrame,
}

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

// ============================================================================
// Codec
// ============================================================================

/// Decode an inbound text frame into structured data
pub fn decode_frame(text: &str) -> ProtocolResult<Value> {
    if text.len() > MAX_FRAME_LENGTH {
        return Err(ProtocolError::FrameTooLarge { len: text.len() });
    }
    if text.trim().is_empty() {
        return Err(ProtocolError::EmptyFrame);
    }
    Ok(serde_json::from_str(text)?)
}

/// Encode an outbound payload into a text frame
pub fn encode_frame<T: Serialize + ?Sized>(payload: &T) -> ProtocolResult<String> {
    let text = serde_json::to_string(payload)?;
    if text.len() > MAX_FRAME_LENGTH {
        return Err(ProtocolError::FrameTooLarge { len: text.len() });
    }
    Ok(text)
}

/// Truncate a frame for logging and error events, respecting char boundaries
pub fn preview(text: &str) -> String {
    if text.len() <= RAW_PREVIEW_LENGTH {
        return text.to_string();
    }
    let mut end = RAW_PREVIEW_LENGTH;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
