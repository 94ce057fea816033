use crate::error::{self, CaptureError, PermissionError};
use crate::frame::FrameData;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// An enumerated camera that can be attached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSource {
    /// Opaque device handle understood by the backend
    pub id: String,
    /// Display label; opaque until permission has been granted
    pub label: String,
}

impl CaptureSource {
    pub fn new<S: Into<String>>(id: S, label: S) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// One acquired hardware capture handle.
pub trait CaptureHandle: Send + Sync {
    /// Latest fully decoded frame, or `None` while the device is warming up.
    fn latest_frame(&self) -> Option<FrameData>;

    /// Stop every hardware track. Must be idempotent.
    fn stop(&mut self);
}

/// Platform camera access.
#[async_trait]
pub trait CameraBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Ask the platform for capture permission. Must not leave any handle open.
    async fn request_permission(&self) -> Result<(), PermissionError>;

    async fn enumerate(&self) -> Result<Vec<CaptureSource>, CaptureError>;

    async fn open(
        &self,
        source: &CaptureSource,
        resolution: (u32, u32),
    ) -> Result<Box<dyn CaptureHandle>, CaptureError>;
}

/// Lists cameras, asking for permission first so labels resolve.
pub struct DeviceEnumerator {
    backend: Arc<dyn CameraBackend>,
}

impl DeviceEnumerator {
    pub fn new(backend: Arc<dyn CameraBackend>) -> Self {
        Self { backend }
    }

    /// Request permission, then enumerate. Safe to call again on refresh.
    ///
    /// A refused permission is `FeedError::Permission`; any other backend
    /// failure is `FeedError::Capture` and says nothing about which devices
    /// exist.
    pub async fn list_cameras(&self) -> error::Result<Vec<CaptureSource>> {
        self.backend.request_permission().await?;

        match self.backend.enumerate().await {
            Ok(sources) => {
                info!(
                    "Found {} camera(s) via {} backend",
                    sources.len(),
                    self.backend.name()
                );
                for source in &sources {
                    debug!("Camera {}: {}", source.id, source.label);
                }
                Ok(sources)
            }
            Err(CaptureError::PermissionDenied { device }) => Err(PermissionError::new(format!(
                "access to {} was refused while enumerating",
                device
            ))
            .into()),
            Err(e) => {
                warn!("Camera enumeration failed: {}", e);
                Err(e.into())
            }
        }
    }
}

/// Choose the source to attach after an enumeration.
///
/// Keeps `current` if it is still present, otherwise prefers a camera whose
/// label contains `preferred_label` (case-insensitive), otherwise the first.
pub fn select_default(
    sources: &[CaptureSource],
    preferred_label: &str,
    current: Option<&str>,
) -> Option<CaptureSource> {
    if let Some(current) = current {
        if let Some(source) = sources.iter().find(|s| s.id == current) {
            return Some(source.clone());
        }
    }

    let preferred = preferred_label.to_lowercase();
    if !preferred.is_empty() {
        if let Some(source) = sources
            .iter()
            .find(|s| s.label.to_lowercase().contains(&preferred))
        {
            return Some(source.clone());
        }
    }

    sources.first().cloned()
}
