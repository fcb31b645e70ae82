//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors that can occur while encoding or decoding messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("empty payload")]
    EmptyPayload,
}
