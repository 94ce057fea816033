use super::device::{CameraBackend, CaptureHandle, CaptureSource};
use crate::error::{CaptureError, PermissionError};
use crate::frame::{FrameData, FrameFormat};
use async_trait::async_trait;
use gstreamer::prelude::*;
use gstreamer::Pipeline;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use parking_lot::Mutex;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, error, info, warn};

/// V4L2 cameras through GStreamer
pub struct GStreamerBackend;

impl GStreamerBackend {
    pub fn new() -> Result<Self, CaptureError> {
        gstreamer::init().map_err(|e| CaptureError::Backend {
            details: format!("Failed to initialize GStreamer: {}", e),
        })?;
        Ok(Self)
    }

    fn device_path(device: &gstreamer::Device) -> Option<String> {
        let props = device.properties()?;
        props
            .get::<String>("device.path")
            .or_else(|_| props.get::<String>("api.v4l2.path"))
            .ok()
    }

    fn video_nodes() -> Vec<String> {
        let Ok(entries) = std::fs::read_dir("/dev") else {
            return Vec::new();
        };
        let mut nodes: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| name.starts_with("video"))
            .map(|name| format!("/dev/{}", name))
            .collect();
        nodes.sort();
        nodes
    }

    fn build_pipeline(device: &str, width: u32, height: u32) -> Result<Pipeline, CaptureError> {
        let desc = format!(
            "v4l2src device={} do-timestamp=true ! \
             videoconvert ! videoscale ! \
             video/x-raw,format=RGB,width={},height={} ! \
             appsink name=sink sync=false max-buffers=1 drop=true",
            device, width, height
        );
        debug!("Creating GStreamer pipeline: {}", desc);

        gstreamer::parse::launch(&desc)
            .map_err(|e| CaptureError::Backend {
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<Pipeline>()
            .map_err(|_| CaptureError::Backend {
                details: "Failed to downcast to Pipeline".to_string(),
            })
    }
}

#[async_trait]
impl CameraBackend for GStreamerBackend {
    fn name(&self) -> &'static str {
        "gstreamer"
    }

    async fn request_permission(&self) -> Result<(), PermissionError> {
        // Opening a node and closing it straight away leaves no handle behind
        for node in Self::video_nodes() {
            match std::fs::File::open(&node) {
                Ok(_) => return Ok(()),
                Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                    return Err(PermissionError::new(format!(
                        "{} is not readable by this user",
                        node
                    )));
                }
                Err(e) => debug!("Skipping {}: {}", node, e),
            }
        }
        Ok(())
    }

    async fn enumerate(&self) -> Result<Vec<CaptureSource>, CaptureError> {
        let monitor = gstreamer::DeviceMonitor::new();
        monitor.add_filter(Some("Video/Source"), None);
        monitor.start().map_err(|e| CaptureError::Backend {
            details: format!("Failed to start device monitor: {}", e),
        })?;

        let sources = monitor
            .devices()
            .iter()
            .filter_map(|device| {
                let path = Self::device_path(device)?;
                Some(CaptureSource::new(path, device.display_name().to_string()))
            })
            .collect();

        monitor.stop();
        Ok(sources)
    }

    async fn open(
        &self,
        source: &CaptureSource,
        resolution: (u32, u32),
    ) -> Result<Box<dyn CaptureHandle>, CaptureError> {
        if let Err(e) = std::fs::File::open(&source.id) {
            return Err(match e.kind() {
                ErrorKind::PermissionDenied => CaptureError::PermissionDenied {
                    device: source.id.clone(),
                },
                _ => CaptureError::DeviceUnavailable {
                    device: source.id.clone(),
                    details: e.to_string(),
                },
            });
        }

        let pipeline = Self::build_pipeline(&source.id, resolution.0, resolution.1)?;
        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| CaptureError::Backend {
                details: "Failed to get appsink element".to_string(),
            })?
            .downcast::<AppSink>()
            .map_err(|_| CaptureError::Backend {
                details: "Failed to downcast to AppSink".to_string(),
            })?;

        let latest: Arc<Mutex<Option<FrameData>>> = Arc::new(Mutex::new(None));
        let counter = Arc::new(AtomicU64::new(0));
        let slot = Arc::clone(&latest);

        appsink.set_callbacks(
            gstreamer_app::AppSinkCallbacks::builder()
                .new_sample(move |sink| {
                    let sample = sink.pull_sample().map_err(|_| gstreamer::FlowError::Eos)?;
                    match sample_to_frame(&sample, counter.fetch_add(1, Ordering::Relaxed)) {
                        Ok(frame) => *slot.lock() = Some(frame),
                        Err(e) => warn!("Dropping camera sample: {}", e),
                    }
                    Ok(gstreamer::FlowSuccess::Ok)
                })
                .build(),
        );

        if let Err(e) = pipeline.set_state(gstreamer::State::Playing) {
            error!("Failed to start pipeline for {}: {}", source.id, e);
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(CaptureError::DeviceUnavailable {
                device: source.id.clone(),
                details: e.to_string(),
            });
        }

        info!("GStreamer capture started on {}", source.id);
        Ok(Box::new(GStreamerHandle {
            pipeline: Some(pipeline),
            latest,
        }))
    }
}

fn sample_to_frame(sample: &gstreamer::Sample, id: u64) -> Result<FrameData, CaptureError> {
    let buffer = sample.buffer().ok_or_else(|| CaptureError::Backend {
        details: "No buffer in sample".to_string(),
    })?;
    let caps = sample.caps().ok_or_else(|| CaptureError::Backend {
        details: "No caps in sample".to_string(),
    })?;
    let info = VideoInfo::from_caps(caps).map_err(|e| CaptureError::Backend {
        details: format!("Failed to get video info: {}", e),
    })?;
    let map = buffer.map_readable().map_err(|e| CaptureError::Backend {
        details: format!("Failed to map buffer: {}", e),
    })?;

    let (width, height) = (info.width(), info.height());
    let row = width as usize * 3;
    let stride = info.stride()[0] as usize;
    let src = map.as_slice();

    // Rows may be padded; repack them tightly
    let data = if stride == row {
        src.to_vec()
    } else {
        let mut packed = Vec::with_capacity(row * height as usize);
        for y in 0..height as usize {
            let start = y * stride;
            let end = start + row;
            if end > src.len() {
                break;
            }
            packed.extend_from_slice(&src[start..end]);
        }
        packed
    };

    Ok(FrameData::new(id, SystemTime::now(), data, width, height, FrameFormat::Rgb24))
}

struct GStreamerHandle {
    pipeline: Option<Pipeline>,
    latest: Arc<Mutex<Option<FrameData>>>,
}

impl CaptureHandle for GStreamerHandle {
    fn latest_frame(&self) -> Option<FrameData> {
        self.latest.lock().clone()
    }

    fn stop(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            if let Err(e) = pipeline.set_state(gstreamer::State::Null) {
                warn!("Failed to stop GStreamer pipeline: {}", e);
            }
            self.latest.lock().take();
            debug!("GStreamer pipeline stopped");
        }
    }
}

impl Drop for GStreamerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
