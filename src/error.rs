//! Error types for connection manager operations.

use thiserror::Error;

/// Errors that can occur while driving a managed connection.
#[derive(Error, Debug)]
pub enum ResocketError {
    /// Configuration rejected by validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Pending queue is full and the overflow policy rejects new messages.
    #[error("Pending queue full: capacity of {capacity} messages reached")]
    QueueFull { capacity: usize },

    /// The manager has been closed and accepts no further work.
    #[error("Connection manager closed")]
    Closed,

    /// A send was attempted on a link that is not open.
    #[error("Link is not open")]
    NotOpen,

    /// Payload could not be encoded as JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error reported by the WebSocket transport.
    #[cfg(feature = "websocket")]
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Generic transport failure.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type alias for connection manager operations.
pub type Result<T> = std::result::Result<T, ResocketError>;

impl ResocketError {
    /// Create a new invalid configuration error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Check if this error signals backpressure (the caller may retry later).
    pub fn is_backpressure(&self) -> bool {
        matches!(self, Self::QueueFull { .. } | Self::NotOpen)
    }

    /// Check if this error means the manager will never accept work again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }
}
