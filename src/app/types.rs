use crate::camera::CaptureSource;
use crate::error::CaptureError;
use crate::frame::FrameData;
use crate::transport::ConnectionState;
use bytes::Bytes;

/// Camera side of the feed status
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureStatus {
    Attached(CaptureSource),
    /// Access refused; stays until a refresh or attach succeeds
    PermissionDenied(String),
    /// Last attach failed; the user can retry or pick another source
    Failed(CaptureError),
    Detached,
}

/// Status snapshot for a connection indicator and camera panel
#[derive(Debug, Clone, PartialEq)]
pub struct FeedStatus {
    pub mounted: bool,
    pub capture: CaptureStatus,
    pub connection: ConnectionState,
    pub streaming: bool,
}

/// System shutdown reason
#[derive(Debug, Clone)]
pub enum ShutdownReason {
    Signal(String),
    Error(String),
    UserRequest,
}

/// What the presentation layer should draw right now
#[derive(Debug, Clone)]
pub enum FeedView {
    /// Processed frame from the inference service (JPEG bytes)
    Processed(Bytes),
    /// Latest local capture, shown while no processed frame is available
    Raw(FrameData),
    /// Nothing to show; carries the persistent reason, e.g. a permission error
    Unavailable { reason: String },
}

impl FeedView {
    pub fn kind(&self) -> &'static str {
        match self {
            FeedView::Processed(_) => "processed",
            FeedView::Raw(_) => "raw",
            FeedView::Unavailable { .. } => "unavailable",
        }
    }
}
