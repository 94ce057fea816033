mod device;
mod mock;
mod source;
#[cfg(all(feature = "camera", target_os = "linux"))]
mod v4l2;

pub use device::{select_default, CameraBackend, CaptureHandle, CaptureSource, DeviceEnumerator};
pub use mock::MockCameraBackend;
pub use source::{ActiveCapture, CaptureController, Liveness};
#[cfg(all(feature = "camera", target_os = "linux"))]
pub use v4l2::GStreamerBackend;

use crate::config::CameraConfig;
use crate::error::CaptureError;
use std::sync::Arc;
use tracing::info;

/// Build the camera backend named in the configuration
pub fn backend_from_config(config: &CameraConfig) -> Result<Arc<dyn CameraBackend>, CaptureError> {
    info!("Using {} camera backend", config.backend);
    match config.backend.as_str() {
        "mock" => Ok(Arc::new(MockCameraBackend::with_default_devices(config.mock_fps))),
        #[cfg(all(feature = "camera", target_os = "linux"))]
        "gstreamer" => Ok(Arc::new(GStreamerBackend::new()?)),
        other => Err(CaptureError::Backend {
            details: format!("camera backend '{}' is not available in this build", other),
        }),
    }
}
