use super::{LiveFeed, ShutdownReason};
use crate::error::{FeedError, Result};
use crate::events::FeedEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tracing::{error, info};

impl LiveFeed {
    /// Run until a signal or [`LiveFeed::request_shutdown`], logging stats
    /// periodically, then tear down.
    pub async fn run(&mut self) -> Result<i32> {
        info!("Live feed is running");

        let mut shutdown_receiver =
            self.shutdown_receiver
                .take()
                .ok_or_else(|| FeedError::System {
                    message: "Shutdown receiver already taken".to_string(),
                })?;

        self.setup_signal_handlers(Arc::clone(&self.shutdown_sender));

        let mut stats_interval = tokio::time::interval(Duration::from_secs(
            self.config.system.stats_interval_seconds,
        ));
        stats_interval.tick().await;

        let shutdown_reason = loop {
            tokio::select! {
                reason = &mut shutdown_receiver => {
                    break reason.map_err(|_| FeedError::System {
                        message: "Shutdown channel closed unexpectedly".to_string(),
                    })?;
                }
                _ = stats_interval.tick() => self.log_stats(),
            }
        };

        info!("Shutdown initiated: {:?}", shutdown_reason);
        self.events.publish(FeedEvent::ShutdownRequested {
            reason: format!("{:?}", shutdown_reason),
        });

        let exit_code = self.teardown().await?;
        self.log_stats();

        info!("Live feed shutdown complete");
        Ok(exit_code)
    }

    /// Set up signal handlers for graceful shutdown
    fn setup_signal_handlers(
        &self,
        shutdown_sender: Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>,
    ) {
        // Handle SIGTERM (systemd stop) - Unix only
        #[cfg(unix)]
        {
            let shutdown_sender_sigterm = Arc::clone(&shutdown_sender);
            let cancel = self.cancellation_token.clone();
            tokio::spawn(async move {
                let mut sigterm =
                    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                        Ok(sigterm) => sigterm,
                        Err(e) => {
                            error!("Failed to register SIGTERM handler: {}", e);
                            return;
                        }
                    };
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    Some(()) = sigterm.recv() => {
                        info!("Received SIGTERM signal");
                        if let Some(sender) = shutdown_sender_sigterm.lock().await.take() {
                            let _ = sender.send(ShutdownReason::Signal("SIGTERM".to_string()));
                        }
                    }
                }
            });
        }

        // Handle SIGINT (Ctrl+C) - Cross-platform
        let shutdown_sender_sigint = Arc::clone(&shutdown_sender);
        let cancel = self.cancellation_token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                Ok(()) = signal::ctrl_c() => {
                    info!("Received SIGINT signal (Ctrl+C)");
                    if let Some(sender) = shutdown_sender_sigint.lock().await.take() {
                        let _ = sender.send(ShutdownReason::Signal("SIGINT".to_string()));
                    }
                }
            }
        });
    }
}
