//! Error types for the chat relay
//!
//! Defines application-level errors and outbound queue errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

use crate::types::ClientId;

/// Application-level errors
///
/// Every variant is either fatal to a single connection (transport,
/// deadlines) or abandons a single operation (serialization, admission).
/// None of them is ever reported to the remote peer.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send error (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,

    /// No frame arrived within the idle timeout
    #[error("Idle timeout after {0:?}")]
    IdleTimeout(std::time::Duration),

    /// A single write did not complete within the write timeout
    #[error("Write timeout after {0:?}")]
    WriteTimeout(std::time::Duration),

    /// The connection is already a registry member
    #[error("Client {0} already admitted")]
    AlreadyAdmitted(ClientId),

    /// Rejected runtime configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Outbound queue errors
///
/// Both variants mean the connection can no longer keep up and is dropped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The outbound queue is at capacity
    #[error("Outbound queue full")]
    QueueFull,
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,
}
