use super::LiveFeed;
use crate::error::Result;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};

const SAMPLER_STOP_TIMEOUT: Duration = Duration::from_secs(2);

impl LiveFeed {
    /// Tear the feed down completely: stop the sampler, close the transport
    /// without reconnecting and release the camera.
    ///
    /// Every step runs even if an earlier one failed.
    pub async fn teardown(&mut self) -> Result<i32> {
        info!("Tearing down live feed");

        self.cancellation_token.cancel();
        let mut exit_code = 0;

        if let Some(task) = self.sampler_task.take() {
            match timeout(SAMPLER_STOP_TIMEOUT, task).await {
                Ok(Ok(())) => info!("sampler component stopped"),
                Ok(Err(e)) => {
                    error!("Sampler task failed: {}", e);
                    exit_code = 1;
                }
                Err(_) => {
                    // The task owns nothing but timers; dropping the handle is enough
                    warn!("sampler component stop timeout");
                    exit_code = 1;
                }
            }
        }
        self.sampler = None;

        if let Some(transport) = self.transport.take() {
            transport.close().await;
            info!("transport component stopped");
        }

        self.capture.shutdown().await;
        info!("capture component stopped");

        info!("Live feed torn down with exit code: {}", exit_code);
        Ok(exit_code)
    }
}
