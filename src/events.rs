use crate::quality::QualityProfile;
use crate::render::RiskLevel;
use crate::transport::ConnectionState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Events published by the live feed pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FeedEvent {
    /// Transport moved to a new connection state
    ConnectionChanged {
        state: ConnectionState,
        timestamp: DateTime<Utc>,
    },
    /// A capture source was attached
    SourceAttached { id: String, label: String },
    /// The active capture source was released
    SourceReleased { id: String },
    /// Camera permission was refused
    PermissionDenied { message: String },
    /// A processed frame arrived from the inference service
    ProcessedFrameReceived { bytes: usize },
    /// A metadata record arrived from the inference service
    MetadataReceived { risk_score: f64, level: RiskLevel },
    /// Frame streaming was paused or resumed
    StreamingToggled { active: bool },
    /// The quality profile changed
    ProfileChanged { profile: QualityProfile },
    /// Shutdown requested
    ShutdownRequested { reason: String },
}

impl FeedEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            FeedEvent::ConnectionChanged { state, .. } => format!("Connection {:?}", state),
            FeedEvent::SourceAttached { id, label } => {
                format!("Camera attached: {} ({})", label, id)
            }
            FeedEvent::SourceReleased { id } => format!("Camera released: {}", id),
            FeedEvent::PermissionDenied { message } => format!("Permission denied: {}", message),
            FeedEvent::ProcessedFrameReceived { bytes } => {
                format!("Processed frame received ({} bytes)", bytes)
            }
            FeedEvent::MetadataReceived { risk_score, level } => {
                format!("Risk {:.0} ({})", risk_score, level.label())
            }
            FeedEvent::StreamingToggled { active } => {
                format!("Streaming {}", if *active { "resumed" } else { "paused" })
            }
            FeedEvent::ProfileChanged { profile } => format!("Profile {:?}", profile.name),
            FeedEvent::ShutdownRequested { reason } => format!("Shutdown requested: {}", reason),
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            FeedEvent::ConnectionChanged { .. } => "connection_changed",
            FeedEvent::SourceAttached { .. } => "source_attached",
            FeedEvent::SourceReleased { .. } => "source_released",
            FeedEvent::PermissionDenied { .. } => "permission_denied",
            FeedEvent::ProcessedFrameReceived { .. } => "processed_frame_received",
            FeedEvent::MetadataReceived { .. } => "metadata_received",
            FeedEvent::StreamingToggled { .. } => "streaming_toggled",
            FeedEvent::ProfileChanged { .. } => "profile_changed",
            FeedEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Broadcast bus for status fan-out. Publishing never blocks the pipeline.
pub struct EventBus {
    sender: broadcast::Sender<FeedEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.sender.subscribe()
    }

    /// Publish an event; returns the number of subscribers that got it
    pub fn publish(&self, event: FeedEvent) -> usize {
        match &event {
            FeedEvent::PermissionDenied { message } => {
                warn!("Camera permission denied: {}", message);
            }
            FeedEvent::ConnectionChanged { state, .. } => {
                debug!("Connection state -> {:?}", state);
            }
            FeedEvent::ShutdownRequested { reason } => {
                info!("Shutdown requested: {}", reason);
            }
            _ => {
                debug!("Event: {}", event.description());
            }
        }

        // No subscribers is fine; status is best-effort
        self.sender.send(event).unwrap_or(0)
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
