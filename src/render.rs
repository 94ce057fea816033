use crate::transport::InboundMetadata;
use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Risk category shown next to the score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 75.0 {
            RiskLevel::Critical
        } else if score >= 50.0 {
            RiskLevel::High
        } else if score >= 25.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }
}

/// Which image the presentation layer should show
#[derive(Debug, Clone, PartialEq)]
pub enum DisplaySource {
    /// Latest processed frame from the inference service (JPEG bytes)
    Processed(Bytes),
    /// Local capture, shown directly
    Raw,
}

#[derive(Debug, Clone, Default)]
pub struct RenderState {
    /// Processed frame received on the current connection
    pub processed_frame: Option<Bytes>,
    pub metadata: Option<InboundMetadata>,
    pub connected: bool,
    pub streaming: bool,
}

/// Latest inference output for presentation.
///
/// Written by the transport and the sampler, read by the presentation
/// layer. The processed frame is dropped on every connect and disconnect,
/// so the display falls back to raw capture until the current connection
/// has produced a frame.
#[derive(Debug)]
pub struct RenderSink {
    state: RwLock<RenderState>,
}

impl RenderSink {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RenderState {
                streaming: true,
                ..RenderState::default()
            }),
        }
    }

    pub fn on_connected(&self) {
        let mut state = self.state.write();
        state.connected = true;
        state.processed_frame = None;
    }

    pub fn on_disconnected(&self) {
        let mut state = self.state.write();
        state.connected = false;
        state.processed_frame = None;
    }

    pub fn apply_processed_frame(&self, frame: Bytes) {
        let mut state = self.state.write();
        if state.processed_frame.is_none() {
            info!("First processed frame received, switching display to processed");
        }
        state.processed_frame = Some(frame);
    }

    /// Replace the metadata record in full
    pub fn apply_metadata(&self, metadata: InboundMetadata) {
        debug!(
            "Metadata: {} person(s), {} object(s), risk {:.1} ({})",
            metadata.detections.person_count,
            metadata.detections.object_count,
            metadata.risk_score,
            metadata.risk_level().label()
        );
        self.state.write().metadata = Some(metadata);
    }

    pub fn set_streaming(&self, streaming: bool) {
        self.state.write().streaming = streaming;
    }

    pub fn display_source(&self) -> DisplaySource {
        let state = self.state.read();
        match (&state.processed_frame, state.connected) {
            (Some(frame), true) => DisplaySource::Processed(frame.clone()),
            _ => DisplaySource::Raw,
        }
    }

    pub fn metadata(&self) -> Option<InboundMetadata> {
        self.state.read().metadata.clone()
    }

    pub fn risk_level(&self) -> Option<RiskLevel> {
        self.state.read().metadata.as_ref().map(|m| m.risk_level())
    }

    pub fn snapshot(&self) -> RenderState {
        self.state.read().clone()
    }
}

impl Default for RenderSink {
    fn default() -> Self {
        Self::new()
    }
}
