use super::LiveFeed;
use crate::camera::{select_default, CaptureSource};
use crate::error::{FeedError, Result};
use crate::sampler::FrameSampler;
use crate::transport::Transport;
use std::sync::Arc;
use tracing::{error, info, warn};

impl LiveFeed {
    /// Bring the feed up: enumerate cameras, attach the default one, start
    /// the transport and the sampler.
    ///
    /// Camera problems leave the feed mounted without a capture so the user
    /// can retry or switch sources.
    pub async fn mount(&mut self) -> Result<()> {
        if self.is_mounted() {
            return Err(FeedError::system("Live feed is already mounted"));
        }
        if self.cancellation_token.is_cancelled() {
            return Err(FeedError::system("Live feed has been torn down"));
        }
        info!("Mounting live feed");

        if let Err(e) = self.refresh_devices().await {
            error!("Camera unavailable: {}", e);
        }

        let transport = Arc::new(Transport::start(
            Arc::clone(&self.connector),
            &self.config.transport,
            Arc::clone(&self.render),
            self.events.clone(),
            Arc::clone(&self.stats),
        ));
        self.transport = Some(Arc::clone(&transport));

        let sampler = Arc::new(FrameSampler::new(
            Arc::clone(&self.capture),
            transport,
            Arc::clone(&self.render),
            self.events.clone(),
            Arc::clone(&self.stats),
        ));
        let task = Arc::clone(&sampler).spawn(
            self.quality.subscribe(),
            self.cancellation_token.child_token(),
        );
        self.sampler = Some(sampler);
        self.sampler_task = Some(task);

        info!(
            "Live feed mounted ({} camera(s), profile {:?})",
            self.sources.lock().len(),
            self.quality.current().name
        );
        Ok(())
    }

    /// Re-enumerate cameras. Keeps the active camera if it is still present,
    /// otherwise attaches the default one.
    ///
    /// A refused permission releases the camera. Any other enumeration
    /// failure leaves the camera and the device list as they were.
    pub async fn refresh_devices(&self) -> Result<Vec<CaptureSource>> {
        let sources = match self.enumerator.list_cameras().await {
            Ok(sources) => sources,
            Err(FeedError::Permission(e)) => {
                self.record_permission_error(e.clone());
                self.sources.lock().clear();
                self.capture.release().await;
                return Err(e.into());
            }
            Err(e) => {
                warn!("Device refresh failed, keeping the current camera: {}", e);
                return Err(e);
            }
        };
        self.permission_error.lock().take();
        *self.sources.lock() = sources.clone();

        if sources.is_empty() {
            warn!("No cameras found");
            self.capture.release().await;
            return Ok(sources);
        }

        let current = self.capture.active_source().await;
        let preferred = self
            .config
            .camera
            .device
            .as_deref()
            .filter(|device| current.is_none() && sources.iter().any(|s| s.id == *device))
            .or(current.as_ref().map(|s| s.id.as_str()));

        if let Some(choice) = select_default(&sources, &self.config.camera.preferred_label, preferred)
        {
            if current.as_ref() != Some(&choice) {
                // Failure is kept for status and view; the feed stays usable
                let _ = self.attach(&choice).await;
            }
        }
        Ok(sources)
    }
}
