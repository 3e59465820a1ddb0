//! Error types for protocol framing.

use thiserror::Error;

/// Errors that can occur when encoding or decoding a frame.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// The frame is not valid JSON, or does not match any known message.
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The message could not be serialized.
    #[error("failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
}
