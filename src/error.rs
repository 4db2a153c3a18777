//! Error types for the streaming client

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True when the capture device could not be opened or started
    pub fn is_capture_unavailable(&self) -> bool {
        matches!(self, Error::Audio(AudioError::Unavailable(_)))
    }

    /// True when the transport never reached the server
    pub fn is_connect_failure(&self) -> bool {
        matches!(self, Error::Network(NetworkError::ConnectionFailed(_)))
    }

    /// True when the connection broke mid-stream
    pub fn is_write_failure(&self) -> bool {
        matches!(self, Error::Network(NetworkError::SendFailed(_)))
    }
}

/// Audio subsystem errors
#[derive(Error, Debug)]
pub enum AudioError {
    /// No device, no permission, or the stream could not be built
    #[error("Capture unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Refused, timed out, or the host did not resolve
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Peer reset, broken pipe, or the transport was already closed
    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Recent address persistence errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Malformed recent address data: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Failed to encode recent addresses: {0}")]
    Encode(String),

    #[error("Failed to persist recent addresses: {0}")]
    Write(#[from] std::io::Error),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
