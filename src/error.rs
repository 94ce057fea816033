use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Permission error: {0}")]
    Permission(#[from] PermissionError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("System error: {message}")]
    System { message: String },
}

/// Camera access was refused by the platform.
///
/// Never retried automatically: capture stays impossible until the
/// permission changes out-of-band, so the caller surfaces it persistently.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Camera access denied: {message}")]
pub struct PermissionError {
    pub message: String,
}

impl PermissionError {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Permission denied for camera {device}")]
    PermissionDenied { device: String },

    #[error("Camera {device} unavailable: {details}")]
    DeviceUnavailable { device: String, details: String },

    #[error("Attach of {device} superseded by a newer request")]
    Superseded { device: String },

    #[error("Capture source has been shut down")]
    ShutDown,

    #[error("Capture backend error: {details}")]
    Backend { details: String },
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to connect to {url}: {details}")]
    Connect { url: String, details: String },

    #[error("Connection attempt timed out after {timeout:?}")]
    ConnectTimeout { timeout: Duration },

    #[error("Connection closed")]
    Closed,

    #[error("Socket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Invalid URL '{url}': {details}")]
    InvalidUrl { url: String, details: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("Capture frame not ready")]
    FrameNotReady,

    #[error("Frame buffer is empty ({width}x{height}, {len} bytes)")]
    EmptyBuffer { width: u32, height: u32, len: usize },

    #[error("Image codec error: {details}")]
    Codec { details: String },
}

impl FeedError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    /// Whether the pipeline can recover from this error without the user
    /// changing anything outside the process.
    pub fn is_recoverable(&self) -> bool {
        match self {
            FeedError::Permission(_) => false,
            FeedError::Capture(CaptureError::PermissionDenied { .. }) => false,
            FeedError::Config(_) => false,
            _ => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, FeedError>;
