//! Error types for the voice client

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio subsystem errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    /// Capture or playback device could not be acquired
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Output device is not ready")]
    NotReady,
}

/// Codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Payload of zero or odd byte length
    #[error("Invalid frame: {len} bytes")]
    InvalidFrame { len: usize },

    #[error("Decoding failed: {0}")]
    DecodeFailure(String),
}

/// Network errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed: {}", .0.as_deref().unwrap_or("no reason given"))]
    Closed(Option<String>),
}

/// Session controller errors, surfaced to whoever asked for the transition
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Playback unavailable: {0}")]
    PlaybackUnavailable(AudioError),

    #[error("Capture unavailable: {0}")]
    CaptureUnavailable(AudioError),

    #[error("Transport unavailable: {0}")]
    Connection(NetworkError),

    #[error("Session is closed")]
    Closed,
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
