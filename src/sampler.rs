use crate::camera::CaptureController;
use crate::encode::encode_frame;
use crate::events::{EventBus, FeedEvent};
use crate::quality::QualityProfile;
use crate::render::RenderSink;
use crate::stats::PipelineStats;
use crate::transport::{ConnectionState, SendOutcome, Transport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// What a single sampler tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Streaming toggled off by the user
    Paused,
    /// Transport not open; nothing captured
    NotConnected,
    /// Previous frame still awaiting its reply; nothing captured
    Backpressured,
    /// Capture has no decoded frame yet
    FrameNotReady,
    EncodeFailed,
    Sent,
}

/// Timer-driven producer: one frame per tick, and only when the transport
/// can take it. Frames are dropped, never queued.
pub struct FrameSampler {
    capture: Arc<CaptureController>,
    transport: Arc<Transport>,
    render: Arc<RenderSink>,
    events: EventBus,
    stats: Arc<PipelineStats>,
    active: AtomicBool,
}

impl FrameSampler {
    pub fn new(
        capture: Arc<CaptureController>,
        transport: Arc<Transport>,
        render: Arc<RenderSink>,
        events: EventBus,
        stats: Arc<PipelineStats>,
    ) -> Self {
        render.set_streaming(true);
        Self {
            capture,
            transport,
            render,
            events,
            stats,
            active: AtomicBool::new(true),
        }
    }

    pub fn tick(&self, profile: &QualityProfile) -> TickOutcome {
        if !self.active.load(Ordering::Acquire) {
            return TickOutcome::Paused;
        }
        self.stats.record_sampled();

        if self.transport.state() != ConnectionState::Open {
            self.stats.record_dropped_disconnected();
            return TickOutcome::NotConnected;
        }
        if self.transport.is_in_flight() {
            self.stats.record_dropped_backpressure();
            return TickOutcome::Backpressured;
        }

        let Some(frame) = self.capture.latest_frame() else {
            self.stats.record_frame_not_ready();
            return TickOutcome::FrameNotReady;
        };

        let encoded = match encode_frame(&frame, profile) {
            Ok(encoded) => encoded,
            Err(e) => {
                debug!("Skipping frame {}: {}", frame.id, e);
                self.stats.record_encode_failure();
                return TickOutcome::EncodeFailed;
            }
        };

        match self.transport.send(encoded) {
            SendOutcome::Accepted => TickOutcome::Sent,
            SendOutcome::NotOpen => {
                self.stats.record_dropped_disconnected();
                TickOutcome::NotConnected
            }
            SendOutcome::InFlight => {
                self.stats.record_dropped_backpressure();
                TickOutcome::Backpressured
            }
        }
    }

    /// Pause or resume streaming. Returns the new state.
    pub fn set_active(&self, active: bool) -> bool {
        let previous = self.active.swap(active, Ordering::AcqRel);
        if previous != active {
            info!("Streaming {}", if active { "resumed" } else { "paused" });
            self.render.set_streaming(active);
            self.events.publish(FeedEvent::StreamingToggled { active });
        }
        active
    }

    pub fn toggle(&self) -> bool {
        self.set_active(!self.is_active())
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Run the sampling loop until `cancel` fires. A profile change takes
    /// effect from the next tick, including its interval.
    pub fn spawn(
        self: Arc<Self>,
        mut profiles: watch::Receiver<QualityProfile>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut profile = *profiles.borrow_and_update();
            let mut ticker = ticker_for(&profile, Instant::now());
            let mut watching = true;

            debug!("Frame sampler started at {}ms", profile.interval_ms);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,

                    changed = profiles.changed(), if watching => match changed {
                        Ok(()) => {
                            profile = *profiles.borrow_and_update();
                            ticker = ticker_for(&profile, Instant::now() + profile.interval());
                            debug!("Frame sampler now at {}ms", profile.interval_ms);
                        }
                        Err(_) => watching = false,
                    },

                    _ = ticker.tick() => {
                        let outcome = self.tick(&profile);
                        trace!("Sampler tick: {:?}", outcome);
                    }
                }
            }
            debug!("Frame sampler stopped");
        })
    }
}

fn ticker_for(profile: &QualityProfile, start: Instant) -> Interval {
    let mut ticker = interval_at(start, profile.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CaptureSource, MockCameraBackend};
    use crate::config::SentinelConfig;
    use crate::quality::QualityController;
    use crate::transport::{loopback, LoopbackAcceptor, LoopbackConnector, LoopbackPeer, WireMessage};
    use std::time::Duration;

    const METADATA: &str = r#"{"detections":{"person_count":0,"object_count":0},"risk_score":5}"#;

    struct Harness {
        sampler: Arc<FrameSampler>,
        transport: Arc<Transport>,
        backend: MockCameraBackend,
        connector: LoopbackConnector,
        acceptor: LoopbackAcceptor,
        stats: Arc<PipelineStats>,
    }

    async fn harness() -> Harness {
        let backend = MockCameraBackend::with_default_devices(30);
        let events = EventBus::new(64);
        let capture = Arc::new(CaptureController::new(
            Arc::new(backend.clone()),
            (640, 480),
            events.clone(),
        ));
        capture
            .attach(&CaptureSource::new("mock1", "DroidCam Source"))
            .await
            .unwrap();

        let (connector, acceptor) = loopback();
        let render = Arc::new(RenderSink::new());
        let stats = Arc::new(PipelineStats::new());
        let transport = Arc::new(Transport::start(
            Arc::new(connector.clone()),
            &SentinelConfig::default().transport,
            Arc::clone(&render),
            events.clone(),
            Arc::clone(&stats),
        ));
        let sampler = Arc::new(FrameSampler::new(
            capture,
            Arc::clone(&transport),
            render,
            events,
            Arc::clone(&stats),
        ));

        Harness {
            sampler,
            transport,
            backend,
            connector,
            acceptor,
            stats,
        }
    }

    async fn connect(harness: &mut Harness) -> LoopbackPeer {
        let peer = harness.acceptor.accept().await.unwrap();
        while harness.transport.state() != ConnectionState::Open {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        peer
    }

    /// Reply to every frame with metadata only
    fn respond(mut peer: LoopbackPeer) -> JoinHandle<u64> {
        tokio::spawn(async move {
            let mut frames = 0;
            while let Some(message) = peer.recv().await {
                if let WireMessage::Binary(_) = message {
                    frames += 1;
                    peer.send_text(METADATA);
                }
            }
            frames
        })
    }

    async fn drain_frames(peer: &mut LoopbackPeer) -> Vec<bytes::Bytes> {
        let mut frames = Vec::new();
        while let Ok(Some(WireMessage::Binary(data))) =
            tokio::time::timeout(Duration::from_millis(5), peer.recv()).await
        {
            frames.push(data);
        }
        frames
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_outcomes() {
        let mut harness = harness().await;
        let profile = QualityProfile::STANDARD;

        assert_eq!(harness.sampler.tick(&profile), TickOutcome::NotConnected);

        let mut peer = connect(&mut harness).await;
        harness.backend.set_frames_ready(false);
        assert_eq!(harness.sampler.tick(&profile), TickOutcome::FrameNotReady);

        harness.backend.set_frames_ready(true);
        assert_eq!(harness.sampler.tick(&profile), TickOutcome::Sent);
        assert_eq!(harness.sampler.tick(&profile), TickOutcome::Backpressured);

        harness.sampler.set_active(false);
        assert_eq!(harness.sampler.tick(&profile), TickOutcome::Paused);

        assert_eq!(drain_frames(&mut peer).await.len(), 1);
        let stats = harness.stats.snapshot();
        assert_eq!(stats.dropped_disconnected, 1);
        assert_eq!(stats.dropped_backpressure, 1);
        assert_eq!(stats.frames_not_ready, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_server_gets_no_backlog() {
        let mut harness = harness().await;
        let mut peer = connect(&mut harness).await;
        let controller = QualityController::new(false);
        let cancel = CancellationToken::new();
        let task = Arc::clone(&harness.sampler).spawn(controller.subscribe(), cancel.clone());

        // Server never answers: exactly one frame may ever reach it
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(drain_frames(&mut peer).await.len(), 1);
        assert!(harness.transport.is_in_flight());
        assert!(harness.stats.snapshot().dropped_backpressure >= 40);

        // One reply releases exactly one more frame
        peer.send_text(METADATA);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(drain_frames(&mut peer).await.len(), 1);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_rate_bounded_by_interval() {
        let mut harness = harness().await;
        let peer = connect(&mut harness).await;
        let responder = respond(peer);

        let controller = QualityController::new(false);
        let cancel = CancellationToken::new();
        let task = Arc::clone(&harness.sampler).spawn(controller.subscribe(), cancel.clone());

        // 30 fps camera, 100 ms interval
        tokio::time::sleep(Duration::from_millis(950)).await;
        let sent = harness.stats.snapshot().frames_sent;
        assert!((9..=10).contains(&sent), "sent {} frames", sent);

        cancel.cancel();
        task.await.unwrap();
        harness.transport.close().await;
        assert_eq!(responder.await.unwrap(), sent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_profile_change_applies_to_next_frame() {
        let mut harness = harness().await;
        let mut peer = connect(&mut harness).await;
        let controller = QualityController::new(false);
        let cancel = CancellationToken::new();
        let task = Arc::clone(&harness.sampler).spawn(controller.subscribe(), cancel.clone());

        let first = drain_frames(&mut peer).await;
        assert_eq!(first.len(), 1);
        let decoded = image::load_from_memory(&first[0]).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (640, 480));

        controller.set_performance_mode(true);
        peer.send_text(METADATA);
        tokio::time::sleep(Duration::from_millis(250)).await;

        let next = drain_frames(&mut peer).await;
        assert_eq!(next.len(), 1);
        let decoded = image::load_from_memory(&next[0]).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (320, 240));

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_sampler_sends_nothing() {
        let mut harness = harness().await;
        let mut peer = connect(&mut harness).await;
        harness.sampler.set_active(false);

        let controller = QualityController::new(false);
        let cancel = CancellationToken::new();
        let task = Arc::clone(&harness.sampler).spawn(controller.subscribe(), cancel.clone());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(drain_frames(&mut peer).await.is_empty());
        assert_eq!(harness.stats.snapshot().frames_sampled, 0);

        assert!(harness.sampler.toggle());
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(drain_frames(&mut peer).await.len(), 1);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_ticks_are_dropped() {
        let harness = harness().await;
        harness.connector.refuse_next(usize::MAX);

        let controller = QualityController::new(false);
        let cancel = CancellationToken::new();
        let task = Arc::clone(&harness.sampler).spawn(controller.subscribe(), cancel.clone());

        tokio::time::sleep(Duration::from_secs(1)).await;
        let stats = harness.stats.snapshot();
        assert_eq!(stats.frames_sent, 0);
        assert!(stats.dropped_disconnected >= 9);

        cancel.cancel();
        task.await.unwrap();
    }
}
