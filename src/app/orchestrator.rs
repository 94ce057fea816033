use super::types::{CaptureStatus, FeedStatus, FeedView, ShutdownReason};
use crate::camera::{CameraBackend, CaptureController, CaptureSource, DeviceEnumerator};
use crate::config::SentinelConfig;
use crate::error::{CaptureError, FeedError, PermissionError, Result};
use crate::events::{EventBus, FeedEvent};
use crate::quality::{QualityController, QualityProfile};
use crate::render::{DisplaySource, RenderSink, RenderState};
use crate::sampler::FrameSampler;
use crate::stats::{PipelineStats, StatsSnapshot};
use crate::transport::{ConnectionState, Connector, InboundMetadata, Transport};
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Live camera feed: capture, sampler, transport and render sink wired
/// together for the lifetime of one mount.
pub struct LiveFeed {
    pub(super) config: SentinelConfig,
    pub(super) events: EventBus,
    pub(super) stats: Arc<PipelineStats>,
    pub(super) render: Arc<RenderSink>,
    pub(super) quality: QualityController,
    pub(super) enumerator: DeviceEnumerator,
    pub(super) capture: Arc<CaptureController>,
    pub(super) connector: Arc<dyn Connector>,

    // Mounted components
    pub(super) transport: Option<Arc<Transport>>,
    pub(super) sampler: Option<Arc<FrameSampler>>,
    pub(super) sampler_task: Option<JoinHandle<()>>,

    pub(super) sources: parking_lot::Mutex<Vec<CaptureSource>>,
    pub(super) permission_error: parking_lot::Mutex<Option<PermissionError>>,
    pub(super) capture_error: parking_lot::Mutex<Option<CaptureError>>,

    // Lifecycle management
    pub(super) shutdown_sender: Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl LiveFeed {
    pub fn new(
        config: SentinelConfig,
        backend: Arc<dyn CameraBackend>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let events = EventBus::new(config.system.event_bus_capacity);
        let quality = QualityController::new(config.quality.performance_mode);
        let capture = Arc::new(CaptureController::new(
            Arc::clone(&backend),
            quality.current().resolution,
            events.clone(),
        ));
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        Self {
            config,
            events,
            stats: Arc::new(PipelineStats::new()),
            render: Arc::new(RenderSink::new()),
            quality,
            enumerator: DeviceEnumerator::new(backend),
            capture,
            connector,
            transport: None,
            sampler: None,
            sampler_task: None,
            sources: parking_lot::Mutex::new(Vec::new()),
            permission_error: parking_lot::Mutex::new(None),
            capture_error: parking_lot::Mutex::new(None),
            shutdown_sender: Arc::new(Mutex::new(Some(shutdown_sender))),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Switch to another enumerated camera. The current capture is released
    /// before the new one is requested.
    pub async fn select_source(&self, id: &str) -> Result<CaptureSource> {
        let source = self
            .sources
            .lock()
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| CaptureError::DeviceUnavailable {
                device: id.to_string(),
                details: "not in the device list".to_string(),
            })?;

        self.attach(&source).await
    }

    pub(super) async fn attach(&self, source: &CaptureSource) -> Result<CaptureSource> {
        match self.capture.attach(source).await {
            Ok(source) => {
                // A working camera means access was granted after all
                if self.permission_error.lock().take().is_some() {
                    info!("Camera access granted, clearing permission error");
                }
                self.capture_error.lock().take();
                Ok(source)
            }
            // A newer request owns the capture now
            Err(e @ CaptureError::Superseded { .. }) => Err(e.into()),
            Err(e) => {
                if let CaptureError::PermissionDenied { device } = &e {
                    self.record_permission_error(PermissionError::new(format!(
                        "access to {} was refused",
                        device
                    )));
                }
                warn!("Camera {} could not be attached: {}", source.id, e);
                *self.capture_error.lock() = Some(e.clone());
                Err(e.into())
            }
        }
    }

    pub(super) fn record_permission_error(&self, error: PermissionError) {
        self.events.publish(FeedEvent::PermissionDenied {
            message: error.message.clone(),
        });
        *self.permission_error.lock() = Some(error);
    }

    /// Switch between the standard and performance-constrained profiles.
    /// The sampler picks the new profile up on its next tick.
    pub fn set_performance_mode(&self, performance_mode: bool) -> QualityProfile {
        let before = self.quality.current();
        let profile = self.quality.set_performance_mode(performance_mode);
        if profile != before {
            self.capture.set_resolution(profile.resolution);
            self.events.publish(FeedEvent::ProfileChanged { profile });
        }
        profile
    }

    /// Pause or resume frame streaming. Returns whether streaming is active.
    pub fn toggle_streaming(&self) -> bool {
        match &self.sampler {
            Some(sampler) => sampler.toggle(),
            None => false,
        }
    }

    /// Current display content: processed frame when available, otherwise
    /// the raw capture, otherwise a placeholder with the reason.
    pub fn view(&self) -> FeedView {
        if let DisplaySource::Processed(frame) = self.render.display_source() {
            return FeedView::Processed(frame);
        }
        if let Some(frame) = self.capture.latest_frame() {
            return FeedView::Raw(frame);
        }

        let reason = match self.permission_error.lock().as_ref() {
            Some(error) => error.to_string(),
            None => match self.capture_error.lock().as_ref() {
                Some(error) => error.to_string(),
                None => "No camera attached".to_string(),
            },
        };
        FeedView::Unavailable { reason }
    }

    /// Camera, connection and streaming status in one snapshot
    pub async fn status(&self) -> FeedStatus {
        let active = self.capture.active_source().await;
        let capture = match active {
            Some(source) => CaptureStatus::Attached(source),
            None => {
                let permission = self.permission_error.lock().clone();
                let failure = self.capture_error.lock().clone();
                match (permission, failure) {
                    (Some(error), _) => CaptureStatus::PermissionDenied(error.message),
                    (None, Some(error)) => CaptureStatus::Failed(error),
                    (None, None) => CaptureStatus::Detached,
                }
            }
        };

        FeedStatus {
            mounted: self.is_mounted(),
            capture,
            connection: self.connection_state(),
            streaming: self.sampler.as_ref().is_some_and(|s| s.is_active()),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.transport
            .as_ref()
            .map(|t| t.state())
            .unwrap_or(ConnectionState::Disconnected)
    }

    pub fn metadata(&self) -> Option<InboundMetadata> {
        self.render.metadata()
    }

    pub fn render_state(&self) -> RenderState {
        self.render.snapshot()
    }

    pub fn sources(&self) -> Vec<CaptureSource> {
        self.sources.lock().clone()
    }

    pub async fn active_source(&self) -> Option<CaptureSource> {
        self.capture.active_source().await
    }

    pub fn permission_error(&self) -> Option<PermissionError> {
        self.permission_error.lock().clone()
    }

    pub fn profile(&self) -> QualityProfile {
        self.quality.current()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.events.subscribe()
    }

    pub fn is_mounted(&self) -> bool {
        self.transport.is_some()
    }

    /// Ask a running [`LiveFeed::run`] loop to tear down
    pub async fn request_shutdown(&self, reason: ShutdownReason) -> Result<()> {
        let sender = self.shutdown_sender.lock().await.take();
        match sender {
            Some(sender) => sender
                .send(reason)
                .map_err(|_| FeedError::system("Shutdown receiver dropped")),
            None => Err(FeedError::system("Shutdown already requested")),
        }
    }

    pub fn config(&self) -> &SentinelConfig {
        &self.config
    }

    pub(super) fn log_stats(&self) {
        let stats = self.stats.snapshot();
        info!(
            "Feed stats: state={}, sent={}, replies={}, dropped(backpressure={}, offline={}, undelivered={}), malformed={}, reconnects={}, efficiency={:.1}%",
            self.connection_state().as_str(),
            stats.frames_sent,
            stats.replies(),
            stats.dropped_backpressure,
            stats.dropped_disconnected,
            stats.dropped_undelivered,
            stats.malformed_messages,
            stats.reconnects,
            stats.efficiency() * 100.0
        );
    }
}
