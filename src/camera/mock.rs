use super::device::{CameraBackend, CaptureHandle, CaptureSource};
use crate::error::{CaptureError, PermissionError};
use crate::frame::{FrameData, FrameFormat};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
struct MockState {
    devices: Mutex<Vec<CaptureSource>>,
    unavailable: Mutex<HashSet<String>>,
    permission_denied: AtomicBool,
    enumeration_fails: AtomicBool,
    frames_ready: AtomicBool,
    live_handles: AtomicUsize,
    opened_total: AtomicUsize,
    permission_requests: AtomicUsize,
    fps: u32,
}

/// Synthetic camera backend that renders a moving test pattern.
///
/// Used for development without hardware and by the test suite, which can
/// inspect how many hardware handles are alive at any moment.
#[derive(Debug, Clone)]
pub struct MockCameraBackend {
    state: Arc<MockState>,
}

impl MockCameraBackend {
    pub fn new(fps: u32) -> Self {
        Self {
            state: Arc::new(MockState {
                devices: Mutex::new(Vec::new()),
                unavailable: Mutex::new(HashSet::new()),
                permission_denied: AtomicBool::new(false),
                enumeration_fails: AtomicBool::new(false),
                frames_ready: AtomicBool::new(true),
                live_handles: AtomicUsize::new(0),
                opened_total: AtomicUsize::new(0),
                permission_requests: AtomicUsize::new(0),
                fps: fps.max(1),
            }),
        }
    }

    /// Backend with the usual two devices, a built-in webcam and a phone camera
    pub fn with_default_devices(fps: u32) -> Self {
        Self::new(fps)
            .with_device("mock0", "Integrated Webcam")
            .with_device("mock1", "DroidCam Source")
    }

    pub fn with_device(self, id: &str, label: &str) -> Self {
        self.state.devices.lock().push(CaptureSource::new(id, label));
        self
    }

    /// Unplug a device; an open handle on it keeps running
    pub fn remove_device(&self, id: &str) {
        self.state.devices.lock().retain(|d| d.id != id);
    }

    pub fn deny_permission(&self, denied: bool) {
        self.state.permission_denied.store(denied, Ordering::SeqCst);
    }

    /// Make device enumeration fail with a backend error
    pub fn fail_enumeration(&self, fails: bool) {
        self.state.enumeration_fails.store(fails, Ordering::SeqCst);
    }

    pub fn set_unavailable(&self, id: &str, unavailable: bool) {
        let mut set = self.state.unavailable.lock();
        if unavailable {
            set.insert(id.to_string());
        } else {
            set.remove(id);
        }
    }

    /// Simulate a device that has not produced its first frame yet
    pub fn set_frames_ready(&self, ready: bool) {
        self.state.frames_ready.store(ready, Ordering::SeqCst);
    }

    pub fn live_handles(&self) -> usize {
        self.state.live_handles.load(Ordering::SeqCst)
    }

    pub fn opened_total(&self) -> usize {
        self.state.opened_total.load(Ordering::SeqCst)
    }

    pub fn permission_requests(&self) -> usize {
        self.state.permission_requests.load(Ordering::SeqCst)
    }
}

impl Default for MockCameraBackend {
    fn default() -> Self {
        Self::with_default_devices(30)
    }
}

#[async_trait]
impl CameraBackend for MockCameraBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn request_permission(&self) -> Result<(), PermissionError> {
        self.state.permission_requests.fetch_add(1, Ordering::SeqCst);
        if self.state.permission_denied.load(Ordering::SeqCst) {
            return Err(PermissionError::new("camera access was not granted"));
        }
        Ok(())
    }

    async fn enumerate(&self) -> Result<Vec<CaptureSource>, CaptureError> {
        if self.state.enumeration_fails.load(Ordering::SeqCst) {
            return Err(CaptureError::Backend {
                details: "device monitor failed to start".to_string(),
            });
        }
        Ok(self.state.devices.lock().clone())
    }

    async fn open(
        &self,
        source: &CaptureSource,
        resolution: (u32, u32),
    ) -> Result<Box<dyn CaptureHandle>, CaptureError> {
        if self.state.permission_denied.load(Ordering::SeqCst) {
            return Err(CaptureError::PermissionDenied {
                device: source.id.clone(),
            });
        }
        if !self.state.devices.lock().iter().any(|d| d.id == source.id) {
            return Err(CaptureError::DeviceUnavailable {
                device: source.id.clone(),
                details: "no such device".to_string(),
            });
        }
        if self.state.unavailable.lock().contains(&source.id) {
            return Err(CaptureError::DeviceUnavailable {
                device: source.id.clone(),
                details: "device busy".to_string(),
            });
        }

        // Let a concurrent attach or shutdown observe the open in progress
        tokio::task::yield_now().await;

        self.state.live_handles.fetch_add(1, Ordering::SeqCst);
        self.state.opened_total.fetch_add(1, Ordering::SeqCst);
        debug!("Mock camera {} opened at {}x{}", source.id, resolution.0, resolution.1);

        Ok(Box::new(MockHandle {
            state: Arc::clone(&self.state),
            started: Instant::now(),
            width: resolution.0,
            height: resolution.1,
            stopped: false,
        }))
    }
}

struct MockHandle {
    state: Arc<MockState>,
    started: Instant,
    width: u32,
    height: u32,
    stopped: bool,
}

impl MockHandle {
    fn frame_index(&self) -> u64 {
        let elapsed = self.started.elapsed();
        (elapsed.as_millis() as u64 * self.state.fps as u64) / 1000
    }

    fn render(&self, index: u64) -> Vec<u8> {
        let (w, h) = (self.width as usize, self.height as usize);
        let mut data = vec![0u8; w * h * 3];
        let offset = (index % 256) as usize;
        for y in 0..h {
            for x in 0..w {
                let i = (y * w + x) * 3;
                data[i] = ((x + offset) % 256) as u8;
                data[i + 1] = ((y + offset) % 256) as u8;
                data[i + 2] = (offset % 256) as u8;
            }
        }
        data
    }
}

impl CaptureHandle for MockHandle {
    fn latest_frame(&self) -> Option<FrameData> {
        if self.stopped || !self.state.frames_ready.load(Ordering::SeqCst) {
            return None;
        }
        let index = self.frame_index();
        Some(FrameData::new(
            index,
            SystemTime::now(),
            self.render(index),
            self.width,
            self.height,
            FrameFormat::Rgb24,
        ))
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.state.live_handles.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
