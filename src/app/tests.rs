use super::*;
use crate::camera::MockCameraBackend;
use crate::config::SentinelConfig;
use crate::error::{CaptureError, FeedError};
use crate::quality::ProfileName;
use crate::transport::{
    loopback, serve_echo, ConnectionState, LoopbackAcceptor, LoopbackConnector, WireMessage,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn create_test_config() -> SentinelConfig {
    let mut config = SentinelConfig::default();
    config.transport.reconnect_delay_ms = 3000;
    config.system.stats_interval_seconds = 5;
    config
}

fn create_feed(backend: &MockCameraBackend) -> (LiveFeed, LoopbackConnector, LoopbackAcceptor) {
    let (connector, acceptor) = loopback();
    let feed = LiveFeed::new(
        create_test_config(),
        Arc::new(backend.clone()),
        Arc::new(connector.clone()),
    );
    (feed, connector, acceptor)
}

async fn wait_until<F: Fn() -> bool>(condition: F, limit: Duration) {
    let deadline = Instant::now() + limit;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within {:?}", limit);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_feed_creation() {
    let backend = MockCameraBackend::with_default_devices(30);
    let (feed, _connector, _acceptor) = create_feed(&backend);

    assert!(!feed.is_mounted());
    assert_eq!(feed.connection_state(), ConnectionState::Disconnected);
    assert_eq!(
        feed.status().await,
        FeedStatus {
            mounted: false,
            capture: CaptureStatus::Detached,
            connection: ConnectionState::Disconnected,
            streaming: false,
        }
    );
    assert!(matches!(feed.view(), FeedView::Unavailable { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_mount_attaches_preferred_camera_and_streams() {
    let backend = MockCameraBackend::with_default_devices(30);
    let (mut feed, _connector, acceptor) = create_feed(&backend);
    let cancel = CancellationToken::new();
    let peer_task = tokio::spawn(serve_echo(acceptor, cancel.clone()));

    feed.mount().await.unwrap();
    assert_eq!(feed.sources().len(), 2);
    assert_eq!(feed.active_source().await.unwrap().label, "DroidCam Source");
    assert_eq!(backend.live_handles(), 1);

    // Raw fallback before the first processed frame
    assert!(matches!(feed.view(), FeedView::Raw(_)));

    let feed_ref = &feed;
    wait_until(
        || matches!(feed_ref.view(), FeedView::Processed(_)),
        Duration::from_secs(2),
    )
    .await;
    assert_eq!(feed.connection_state(), ConnectionState::Open);
    assert!(feed.metadata().is_some());
    assert!(feed.stats().frames_sent >= 1);

    let status = feed.status().await;
    assert!(status.mounted && status.streaming);
    assert_eq!(status.connection, ConnectionState::Open);
    assert!(matches!(status.capture, CaptureStatus::Attached(ref s) if s.id == "mock1"));

    assert_eq!(feed.teardown().await.unwrap(), 0);
    cancel.cancel();
    peer_task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_teardown_releases_everything() {
    let backend = MockCameraBackend::with_default_devices(30);
    let (mut feed, connector, mut acceptor) = create_feed(&backend);

    feed.mount().await.unwrap();
    let mut peer = acceptor.accept().await.unwrap();
    let feed_ref = &feed;
    wait_until(
        || feed_ref.connection_state() == ConnectionState::Open,
        Duration::from_secs(1),
    )
    .await;

    assert_eq!(feed.teardown().await.unwrap(), 0);

    assert_eq!(backend.live_handles(), 0);
    assert!(!feed.is_mounted());
    assert_eq!(feed.connection_state(), ConnectionState::Disconnected);
    let status = feed.status().await;
    assert!(!status.mounted && !status.streaming);
    assert_eq!(status.capture, CaptureStatus::Detached);

    // Socket closed and never re-dialled
    while let Some(message) = peer.recv().await {
        assert!(matches!(message, WireMessage::Binary(_)));
    }
    let attempts = connector.attempts();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(connector.attempts(), attempts);

    // Torn down for good
    assert!(feed.mount().await.is_err());
    assert_eq!(backend.live_handles(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_permission_denied_is_persistent() {
    let backend = MockCameraBackend::with_default_devices(30);
    backend.deny_permission(true);
    let (mut feed, _connector, _acceptor) = create_feed(&backend);
    let mut events = feed.subscribe();

    feed.mount().await.unwrap();

    assert!(feed.permission_error().is_some());
    assert_eq!(backend.live_handles(), 0);
    assert!(matches!(
        feed.status().await.capture,
        CaptureStatus::PermissionDenied(_)
    ));

    // Still reported on every view until the permission changes
    for _ in 0..3 {
        tokio::time::sleep(Duration::from_millis(500)).await;
        let FeedView::Unavailable { reason } = feed.view() else {
            panic!("expected placeholder view");
        };
        assert!(reason.contains("Camera access denied"));
    }

    let mut saw_denied = false;
    while let Ok(event) = events.try_recv() {
        saw_denied |= event.event_type() == "permission_denied";
    }
    assert!(saw_denied);

    // Granting permission and refreshing recovers
    backend.deny_permission(false);
    feed.refresh_devices().await.unwrap();
    assert!(feed.permission_error().is_none());
    assert_eq!(backend.live_handles(), 1);
    assert!(matches!(feed.view(), FeedView::Raw(_)));

    feed.teardown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_select_source_switches_with_one_handle() {
    let backend = MockCameraBackend::with_default_devices(30);
    let (mut feed, _connector, _acceptor) = create_feed(&backend);
    feed.mount().await.unwrap();

    let source = feed.select_source("mock0").await.unwrap();
    assert_eq!(source.label, "Integrated Webcam");
    assert_eq!(backend.live_handles(), 1);
    assert_eq!(backend.opened_total(), 2);

    let err = feed.select_source("nope").await.unwrap_err();
    assert!(matches!(
        err,
        FeedError::Capture(CaptureError::DeviceUnavailable { .. })
    ));
    // A failed switch request does not drop the current camera
    assert_eq!(feed.active_source().await.unwrap().id, "mock0");

    // Busy device: attach fails, UI stays usable and can retry
    backend.set_unavailable("mock1", true);
    assert!(feed.select_source("mock1").await.is_err());
    assert_eq!(backend.live_handles(), 0);
    assert!(matches!(
        feed.status().await.capture,
        CaptureStatus::Failed(CaptureError::DeviceUnavailable { .. })
    ));
    let FeedView::Unavailable { reason } = feed.view() else {
        panic!("expected placeholder view");
    };
    assert!(reason.contains("device busy"));

    backend.set_unavailable("mock1", false);
    feed.select_source("mock1").await.unwrap();
    assert_eq!(backend.live_handles(), 1);

    feed.teardown().await.unwrap();
    assert_eq!(backend.live_handles(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_successful_attach_clears_permission_error() {
    let backend = MockCameraBackend::with_default_devices(30);
    let (mut feed, _connector, _acceptor) = create_feed(&backend);
    feed.mount().await.unwrap();

    backend.deny_permission(true);
    let err = feed.select_source("mock0").await.unwrap_err();
    assert!(matches!(
        err,
        FeedError::Capture(CaptureError::PermissionDenied { .. })
    ));
    assert!(feed.permission_error().is_some());

    backend.deny_permission(false);
    feed.select_source("mock0").await.unwrap();
    assert_eq!(backend.live_handles(), 1);
    assert!(feed.permission_error().is_none());
    assert!(matches!(feed.view(), FeedView::Raw(_)));
    assert!(matches!(
        feed.status().await.capture,
        CaptureStatus::Attached(ref s) if s.id == "mock0"
    ));

    feed.teardown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failed_enumeration_keeps_working_camera() {
    let backend = MockCameraBackend::with_default_devices(30);
    let (mut feed, _connector, _acceptor) = create_feed(&backend);
    feed.mount().await.unwrap();
    assert_eq!(backend.live_handles(), 1);

    backend.fail_enumeration(true);
    let err = feed.refresh_devices().await.unwrap_err();
    assert!(matches!(err, FeedError::Capture(CaptureError::Backend { .. })));

    assert_eq!(backend.live_handles(), 1);
    assert_eq!(feed.sources().len(), 2);
    assert_eq!(feed.active_source().await.unwrap().id, "mock1");
    assert!(feed.permission_error().is_none());
    assert!(matches!(feed.view(), FeedView::Raw(_)));

    // A successful refresh that finds no cameras does release it
    backend.fail_enumeration(false);
    backend.remove_device("mock0");
    backend.remove_device("mock1");
    assert!(feed.refresh_devices().await.unwrap().is_empty());
    assert_eq!(backend.live_handles(), 0);
    assert!(feed.active_source().await.is_none());

    feed.teardown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_refresh_keeps_current_source() {
    let backend = MockCameraBackend::with_default_devices(30);
    let (mut feed, _connector, _acceptor) = create_feed(&backend);
    feed.mount().await.unwrap();

    feed.select_source("mock0").await.unwrap();
    let opened = backend.opened_total();

    feed.refresh_devices().await.unwrap();
    assert_eq!(feed.active_source().await.unwrap().id, "mock0");
    assert_eq!(backend.opened_total(), opened);
    assert_eq!(backend.permission_requests(), 2);

    feed.teardown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_no_cameras_shows_placeholder() {
    let backend = MockCameraBackend::new(30);
    let (mut feed, _connector, _acceptor) = create_feed(&backend);
    feed.mount().await.unwrap();

    assert!(feed.sources().is_empty());
    let FeedView::Unavailable { reason } = feed.view() else {
        panic!("expected placeholder view");
    };
    assert_eq!(reason, "No camera attached");

    feed.teardown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_performance_mode_and_streaming_toggle() {
    let backend = MockCameraBackend::with_default_devices(30);
    let (mut feed, _connector, _acceptor) = create_feed(&backend);
    let mut events = feed.subscribe();
    feed.mount().await.unwrap();

    let profile = feed.set_performance_mode(true);
    assert_eq!(profile.name, ProfileName::PerformanceConstrained);
    assert_eq!(feed.profile(), profile);
    // Same mode again is not a change
    feed.set_performance_mode(true);

    assert!(feed.render_state().streaming);
    assert!(!feed.toggle_streaming());
    assert!(!feed.render_state().streaming);
    assert!(feed.toggle_streaming());

    let mut profile_changes = 0;
    let mut toggles = 0;
    while let Ok(event) = events.try_recv() {
        match event.event_type() {
            "profile_changed" => profile_changes += 1,
            "streaming_toggled" => toggles += 1,
            _ => {}
        }
    }
    assert_eq!(profile_changes, 1);
    assert_eq!(toggles, 2);

    feed.teardown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_run_until_shutdown_requested() {
    let backend = MockCameraBackend::with_default_devices(30);
    let (mut feed, _connector, _acceptor) = create_feed(&backend);
    feed.mount().await.unwrap();

    let sender = Arc::clone(&feed.shutdown_sender);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(12)).await;
        if let Some(sender) = sender.lock().await.take() {
            let _ = sender.send(ShutdownReason::UserRequest);
        }
    });

    assert_eq!(feed.run().await.unwrap(), 0);
    assert_eq!(backend.live_handles(), 0);
    assert!(feed.request_shutdown(ShutdownReason::UserRequest).await.is_err());
    assert!(feed.run().await.is_err());
}
