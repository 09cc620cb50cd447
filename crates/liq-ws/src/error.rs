//! Error types for the websocket layer.

use liq_rest::RestError;
use thiserror::Error;

/// Websocket errors.
#[derive(Debug, Error)]
pub enum WsError {
    #[error("WebSocket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Frame parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Listen key request failed: {0}")]
    ListenKey(#[from] RestError),

    #[error("Reconnect attempts exhausted after {attempts}")]
    ReconnectExhausted { attempts: u32 },

    #[error("Event receiver dropped")]
    ReceiverDropped,
}

/// Result type alias for websocket operations.
pub type WsResult<T> = std::result::Result<T, WsError>;
