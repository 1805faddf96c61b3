//! Unified error handling for webridge.

use std::time::Duration;

use thiserror::Error;

/// Errors on the upstream (fe-web WebSocket) path.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("websocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("upstream handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    #[error("invalid upstream url: {0}")]
    InvalidUrl(String),

    #[error("encrypted frame too short: {0} bytes")]
    FrameTooShort(usize),

    #[error("frame decryption failed")]
    Decrypt,

    #[error("key derivation failed")]
    KeyDerivation,

    #[error("invalid upstream message: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result type for upstream operations.
pub type UpstreamResult<T> = Result<T, UpstreamError>;
