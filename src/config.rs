use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SentinelConfig {
    pub camera: CameraConfig,
    pub transport: TransportConfig,
    pub quality: QualityConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Label fragment that marks the preferred default camera
    #[serde(default = "default_preferred_label")]
    pub preferred_label: String,

    /// Explicit device id to attach instead of the default selection
    #[serde(default)]
    pub device: Option<String>,

    /// Capture backend: "mock" or "gstreamer"
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Frame rate of the synthetic mock camera
    #[serde(default = "default_mock_fps")]
    pub mock_fps: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TransportConfig {
    /// WebSocket endpoint of the inference service
    #[serde(default = "default_url")]
    pub url: String,

    /// Fixed delay before a reconnect attempt
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Upper bound on a single connect attempt
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct QualityConfig {
    /// Select the performance-constrained profile
    #[serde(default)]
    pub performance_mode: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Interval between periodic stats log lines
    #[serde(default = "default_stats_interval_seconds")]
    pub stats_interval_seconds: u64,
}

impl TransportConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl SentinelConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("sentinel.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("camera.preferred_label", default_preferred_label())?
            .set_default("camera.backend", default_backend())?
            .set_default("camera.mock_fps", default_mock_fps() as i64)?
            .set_default("transport.url", default_url())?
            .set_default(
                "transport.reconnect_delay_ms",
                default_reconnect_delay_ms() as i64,
            )?
            .set_default(
                "transport.connect_timeout_ms",
                default_connect_timeout_ms() as i64,
            )?
            .set_default("quality.performance_mode", false)?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .set_default(
                "system.stats_interval_seconds",
                default_stats_interval_seconds() as i64,
            )?
            .add_source(File::with_name(&path_str).required(false))
            .add_source(Environment::with_prefix("SENTINEL").separator("_"))
            .build()?;

        let config: SentinelConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Render the configuration as TOML, in the same shape `load_from_file` reads
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Message(e.to_string()))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.camera.backend.as_str() {
            "mock" | "gstreamer" => {}
            other => {
                return Err(ConfigError::Message(format!(
                    "Unknown camera backend '{}', expected 'mock' or 'gstreamer'",
                    other
                )));
            }
        }

        if self.camera.mock_fps == 0 {
            return Err(ConfigError::Message(
                "Camera mock_fps must be greater than 0".to_string(),
            ));
        }

        let url = url::Url::parse(&self.transport.url).map_err(|e| {
            ConfigError::Message(format!("Invalid transport url '{}': {}", self.transport.url, e))
        })?;
        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(ConfigError::Message(format!(
                "Transport url must use ws:// or wss://, got '{}'",
                url.scheme()
            )));
        }

        if self.transport.reconnect_delay_ms == 0 {
            return Err(ConfigError::Message(
                "Transport reconnect_delay_ms must be greater than 0".to_string(),
            ));
        }

        if self.transport.connect_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Transport connect_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        if self.system.stats_interval_seconds == 0 {
            return Err(ConfigError::Message(
                "Stats interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                preferred_label: default_preferred_label(),
                device: None,
                backend: default_backend(),
                mock_fps: default_mock_fps(),
            },
            transport: TransportConfig {
                url: default_url(),
                reconnect_delay_ms: default_reconnect_delay_ms(),
                connect_timeout_ms: default_connect_timeout_ms(),
            },
            quality: QualityConfig {
                performance_mode: false,
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
                stats_interval_seconds: default_stats_interval_seconds(),
            },
        }
    }
}

// Default value functions
fn default_preferred_label() -> String {
    "droidcam".to_string()
}
fn default_backend() -> String {
    "mock".to_string()
}
fn default_mock_fps() -> u32 {
    30
}

fn default_url() -> String {
    "ws://localhost:8000/ws/live-feed".to_string()
}
fn default_reconnect_delay_ms() -> u64 {
    3000
}
fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_event_bus_capacity() -> usize {
    64
}
fn default_stats_interval_seconds() -> u64 {
    30
}
