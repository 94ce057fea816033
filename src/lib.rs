pub mod app;
pub mod camera;
pub mod config;
pub mod encode;
pub mod error;
pub mod events;
pub mod frame;
pub mod quality;
pub mod render;
pub mod sampler;
pub mod stats;
pub mod transport;

pub use app::{CaptureStatus, FeedStatus, FeedView, LiveFeed, ShutdownReason};
pub use camera::{
    backend_from_config, select_default, CameraBackend, CaptureController, CaptureHandle,
    CaptureSource, DeviceEnumerator, MockCameraBackend,
};
pub use config::SentinelConfig;
pub use error::{CaptureError, EncodeError, FeedError, PermissionError, Result, TransportError};
pub use events::{EventBus, FeedEvent};
pub use frame::{EncodedFrame, FrameData, FrameFormat};
pub use quality::{select_profile, ProfileName, QualityController, QualityProfile};
pub use render::{DisplaySource, RenderSink, RiskLevel};
pub use sampler::{FrameSampler, TickOutcome};
pub use stats::{PipelineStats, StatsSnapshot};
pub use transport::{
    loopback, ConnectionState, Connector, InboundMetadata, SendOutcome, Transport,
    WebSocketConnector,
};
