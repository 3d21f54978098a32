//! Error types for the realtime subsystem.

use thiserror::Error;

/// Main error type for realtime operations.
#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Subscription already registered: {0}")]
    DuplicateSubscription(String),

    #[error("Sound playback failed: {0}")]
    Playback(String),
}

impl From<serde_json::Error> for RealtimeError {
    fn from(e: serde_json::Error) -> Self {
        RealtimeError::Serialization(e.to_string())
    }
}

impl From<url::ParseError> for RealtimeError {
    fn from(e: url::ParseError) -> Self {
        RealtimeError::InvalidEndpoint(e.to_string())
    }
}

impl From<tungstenite::Error> for RealtimeError {
    fn from(e: tungstenite::Error) -> Self {
        match e {
            tungstenite::Error::Io(io) => RealtimeError::Io(io),
            other => RealtimeError::WebSocket(other.to_string()),
        }
    }
}

/// Result type for realtime operations.
pub type Result<T> = std::result::Result<T, RealtimeError>;
