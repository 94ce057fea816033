use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the capture to inference round trip
#[derive(Debug, Default)]
pub struct PipelineStats {
    frames_sampled: AtomicU64,
    frames_sent: AtomicU64,
    bytes_sent: AtomicU64,
    dropped_backpressure: AtomicU64,
    dropped_disconnected: AtomicU64,
    dropped_undelivered: AtomicU64,
    frames_not_ready: AtomicU64,
    encode_failures: AtomicU64,
    processed_frames: AtomicU64,
    metadata_messages: AtomicU64,
    malformed_messages: AtomicU64,
    connection_attempts: AtomicU64,
    reconnects: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub frames_sampled: u64,
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub dropped_backpressure: u64,
    /// Sampler ticks skipped because the connection was not open
    pub dropped_disconnected: u64,
    /// Frames accepted for sending but discarded when the connection dropped
    pub dropped_undelivered: u64,
    pub frames_not_ready: u64,
    pub encode_failures: u64,
    pub processed_frames: u64,
    pub metadata_messages: u64,
    pub malformed_messages: u64,
    pub connection_attempts: u64,
    pub reconnects: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sampled(&self) {
        self.frames_sampled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sent(&self, bytes: usize) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_dropped_backpressure(&self) {
        self.dropped_backpressure.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_disconnected(&self) {
        self.dropped_disconnected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_undelivered(&self) {
        self.dropped_undelivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_not_ready(&self) {
        self.frames_not_ready.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_encode_failure(&self) {
        self.encode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_processed_frame(&self) {
        self.processed_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_metadata(&self) {
        self.metadata_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_attempt(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_sampled: self.frames_sampled.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            dropped_backpressure: self.dropped_backpressure.load(Ordering::Relaxed),
            dropped_disconnected: self.dropped_disconnected.load(Ordering::Relaxed),
            dropped_undelivered: self.dropped_undelivered.load(Ordering::Relaxed),
            frames_not_ready: self.frames_not_ready.load(Ordering::Relaxed),
            encode_failures: self.encode_failures.load(Ordering::Relaxed),
            processed_frames: self.processed_frames.load(Ordering::Relaxed),
            metadata_messages: self.metadata_messages.load(Ordering::Relaxed),
            malformed_messages: self.malformed_messages.load(Ordering::Relaxed),
            connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    /// Share of sampled ticks that actually put a frame on the wire.
    /// Frames discarded on disconnect are counted separately and left out.
    pub fn efficiency(&self) -> f64 {
        let dropped = self.dropped_backpressure + self.dropped_disconnected;
        let total = self.frames_sent + dropped;
        if total > 0 {
            self.frames_sent as f64 / total as f64
        } else {
            1.0
        }
    }

    /// Inbound messages that acknowledged a frame
    pub fn replies(&self) -> u64 {
        self.processed_frames + self.metadata_messages
    }
}
