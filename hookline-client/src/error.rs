//! Client error types.

use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] hookline_protocol::ProtocolError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("not connected")]
    NotConnected,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("failed to spawn worker: {0}")]
    WorkerSpawn(String),
}

impl ClientError {
    /// Returns whether the error means the socket is gone and a reconnect is needed.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_)
                | ClientError::WebSocket(_)
                | ClientError::NotConnected
                | ClientError::ConnectionClosed
        )
    }
}
