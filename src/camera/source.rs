use super::device::{CameraBackend, CaptureHandle, CaptureSource};
use crate::error::CaptureError;
use crate::events::{EventBus, FeedEvent};
use crate::frame::FrameData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Whether an acquired capture still holds its hardware tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Attached,
    Stopped,
}

/// An attached camera together with its hardware handle.
///
/// Dropping it stops the hardware tracks.
pub struct ActiveCapture {
    source: CaptureSource,
    handle: Box<dyn CaptureHandle>,
    liveness: Liveness,
}

impl ActiveCapture {
    fn new(source: CaptureSource, handle: Box<dyn CaptureHandle>) -> Self {
        Self {
            source,
            handle,
            liveness: Liveness::Attached,
        }
    }

    pub fn source(&self) -> &CaptureSource {
        &self.source
    }

    pub fn liveness(&self) -> Liveness {
        self.liveness
    }

    pub fn latest_frame(&self) -> Option<FrameData> {
        match self.liveness {
            Liveness::Attached => self.handle.latest_frame(),
            Liveness::Stopped => None,
        }
    }

    /// Stop all hardware tracks.
    pub fn release(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if self.liveness == Liveness::Attached {
            self.handle.stop();
            self.liveness = Liveness::Stopped;
        }
    }
}

impl Drop for ActiveCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Owns the single active capture handle.
///
/// `attach` always releases the previous capture before asking the backend
/// for a new one, so at most one hardware handle is alive at any time.
pub struct CaptureController {
    backend: Arc<dyn CameraBackend>,
    resolution: parking_lot::Mutex<(u32, u32)>,
    active: Mutex<Option<ActiveCapture>>,
    generation: AtomicU64,
    closed: AtomicBool,
    events: EventBus,
}

impl CaptureController {
    pub fn new(backend: Arc<dyn CameraBackend>, resolution: (u32, u32), events: EventBus) -> Self {
        Self {
            backend,
            resolution: parking_lot::Mutex::new(resolution),
            active: Mutex::new(None),
            generation: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            events,
        }
    }

    /// Release any current capture and acquire `source`.
    ///
    /// If another attach, a release or a shutdown is requested while the
    /// backend is still opening the device, the new handle is stopped
    /// immediately instead of installed.
    pub async fn attach(&self, source: &CaptureSource) -> Result<CaptureSource, CaptureError> {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut active = self.active.lock().await;

        if self.closed.load(Ordering::SeqCst) {
            return Err(CaptureError::ShutDown);
        }
        if self.generation.load(Ordering::SeqCst) != ticket {
            debug!("Attach of {} superseded before it started", source.id);
            return Err(CaptureError::Superseded {
                device: source.id.clone(),
            });
        }

        self.release_locked(&mut active);

        info!("Attaching camera {} ({})", source.id, source.label);
        let resolution = *self.resolution.lock();
        let handle = self.backend.open(source, resolution).await.map_err(|e| {
            warn!("Failed to attach camera {}: {}", source.id, e);
            e
        })?;
        let capture = ActiveCapture::new(source.clone(), handle);

        if self.closed.load(Ordering::SeqCst) {
            capture.release();
            return Err(CaptureError::ShutDown);
        }
        if self.generation.load(Ordering::SeqCst) != ticket {
            debug!("Attach of {} superseded while opening, releasing", source.id);
            capture.release();
            return Err(CaptureError::Superseded {
                device: source.id.clone(),
            });
        }

        *active = Some(capture);
        self.events.publish(FeedEvent::SourceAttached {
            id: source.id.clone(),
            label: source.label.clone(),
        });
        Ok(source.clone())
    }

    /// Stop and drop the current capture, if any.
    pub async fn release(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut active = self.active.lock().await;
        self.release_locked(&mut active);
    }

    /// Release the capture and refuse any further attach.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.release().await;
    }

    /// Capture resolution requested on the next attach
    pub fn set_resolution(&self, resolution: (u32, u32)) {
        *self.resolution.lock() = resolution;
    }

    /// Latest decoded frame of the active capture.
    ///
    /// Returns `None` while an attach is in progress.
    pub fn latest_frame(&self) -> Option<FrameData> {
        let active = self.active.try_lock().ok()?;
        active.as_ref().and_then(|capture| capture.latest_frame())
    }

    pub async fn active_source(&self) -> Option<CaptureSource> {
        let active = self.active.lock().await;
        active.as_ref().map(|capture| capture.source().clone())
    }

    pub async fn is_attached(&self) -> bool {
        let active = self.active.lock().await;
        matches!(active.as_ref().map(|c| c.liveness()), Some(Liveness::Attached))
    }

    fn release_locked(&self, active: &mut Option<ActiveCapture>) {
        if let Some(capture) = active.take() {
            let id = capture.source().id.clone();
            info!("Releasing camera {}", id);
            capture.release();
            self.events.publish(FeedEvent::SourceReleased { id });
        }
    }
}
