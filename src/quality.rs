use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

/// Named capture/encode profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProfileName {
    Standard,
    PerformanceConstrained,
}

/// Frame cadence, capture resolution and encode quality, always selected
/// together as one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityProfile {
    pub name: ProfileName,
    pub interval_ms: u64,
    pub resolution: (u32, u32),
    /// JPEG quality factor (1-100)
    pub encode_quality: u8,
}

impl QualityProfile {
    pub const STANDARD: QualityProfile = QualityProfile {
        name: ProfileName::Standard,
        interval_ms: 100,
        resolution: (640, 480),
        encode_quality: 80,
    };

    pub const PERFORMANCE_CONSTRAINED: QualityProfile = QualityProfile {
        name: ProfileName::PerformanceConstrained,
        interval_ms: 200,
        resolution: (320, 240),
        encode_quality: 50,
    };

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Pick the profile for the given performance flag.
pub fn select_profile(performance_constrained: bool) -> QualityProfile {
    if performance_constrained {
        QualityProfile::PERFORMANCE_CONSTRAINED
    } else {
        QualityProfile::STANDARD
    }
}

/// Holds the active profile and lets the sampler observe changes.
///
/// Changes take effect on the next sampler tick.
pub struct QualityController {
    sender: watch::Sender<QualityProfile>,
}

impl QualityController {
    pub fn new(performance_mode: bool) -> Self {
        let (sender, _) = watch::channel(select_profile(performance_mode));
        Self { sender }
    }

    pub fn set_performance_mode(&self, performance_mode: bool) -> QualityProfile {
        let profile = select_profile(performance_mode);
        let changed = self.sender.send_if_modified(|current| {
            if *current == profile {
                false
            } else {
                *current = profile;
                true
            }
        });
        if changed {
            info!(
                "Quality profile switched to {:?} ({}ms, {}x{}, q{})",
                profile.name,
                profile.interval_ms,
                profile.resolution.0,
                profile.resolution.1,
                profile.encode_quality
            );
        }
        profile
    }

    pub fn current(&self) -> QualityProfile {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<QualityProfile> {
        self.sender.subscribe()
    }
}
