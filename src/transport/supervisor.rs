use super::connector::{Connection, Connector};
use super::gate::InFlightGate;
use super::message::{demux, Inbound, InboundMetadata, WireMessage};
use super::state::ConnectionState;
use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::events::{EventBus, FeedEvent};
use crate::frame::EncodedFrame;
use crate::render::RenderSink;
use crate::stats::PipelineStats;
use bytes::Bytes;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

/// Result of offering a frame to the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Marked in flight and queued for the socket
    Accepted,
    /// Connection not open; frame dropped
    NotOpen,
    /// A frame is already awaiting its reply; frame dropped
    InFlight,
}

struct TransportShared {
    state: RwLock<ConnectionState>,
    gate: InFlightGate,
    render: Arc<RenderSink>,
    events: EventBus,
    stats: Arc<PipelineStats>,
}

impl TransportShared {
    fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.write();
        self.apply_state(&mut state, next);
    }

    fn apply_state(&self, state: &mut ConnectionState, next: ConnectionState) {
        if *state == next {
            return;
        }
        if !state.can_transition_to(next) {
            warn!("Unexpected connection transition {:?} -> {:?}", *state, next);
        }
        debug!("Connection {} -> {}", state.as_str(), next.as_str());
        *state = next;
        self.events.publish(FeedEvent::ConnectionChanged {
            state: next,
            timestamp: Utc::now(),
        });
    }

    /// Leave any connected state. Clears the in-flight marker under the same
    /// lock the sender checks, then discards any frame not yet written.
    fn enter_disconnected(&self, outbound: &mut mpsc::Receiver<EncodedFrame>) {
        {
            let mut state = self.state.write();
            self.apply_state(&mut state, ConnectionState::Disconnected);
            if self.gate.clear() {
                debug!("Cleared in-flight frame on disconnect");
            }
        }
        while let Ok(frame) = outbound.try_recv() {
            trace!("Discarding undelivered frame {}", frame.source_id);
            self.stats.record_dropped_undelivered();
        }
        self.render.on_disconnected();
    }

    fn on_processed_frame(&self, frame: Bytes) {
        self.stats.record_processed_frame();
        self.events
            .publish(FeedEvent::ProcessedFrameReceived { bytes: frame.len() });
        self.render.apply_processed_frame(frame);
    }

    fn on_metadata(&self, metadata: InboundMetadata) {
        self.stats.record_metadata();
        if let Some(message) = &metadata.error {
            warn!("Inference service reported: {}", message);
        }
        self.events.publish(FeedEvent::MetadataReceived {
            risk_score: metadata.risk_score,
            level: metadata.risk_level(),
        });
        self.render.apply_metadata(metadata);
    }
}

enum ConnectionEnd {
    Cancelled,
    Lost(String),
}

/// Supervised connection to the inference service.
///
/// A background task connects, runs the connection until it fails, waits
/// the reconnect delay and starts over, for as long as the transport lives.
/// Only [`Transport::close`] stops it.
pub struct Transport {
    shared: Arc<TransportShared>,
    outbound: mpsc::Sender<EncodedFrame>,
    task: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl Transport {
    pub fn start(
        connector: Arc<dyn Connector>,
        config: &TransportConfig,
        render: Arc<RenderSink>,
        events: EventBus,
        stats: Arc<PipelineStats>,
    ) -> Self {
        let shared = Arc::new(TransportShared {
            state: RwLock::new(ConnectionState::Disconnected),
            gate: InFlightGate::new(),
            render,
            events,
            stats,
        });
        let (outbound, outbound_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        info!("Starting transport to {}", connector.endpoint());
        let task = tokio::spawn(supervise(
            Arc::clone(&shared),
            connector,
            outbound_rx,
            config.reconnect_delay(),
            config.connect_timeout(),
            cancel.clone(),
        ));

        Self {
            shared,
            outbound,
            task: Mutex::new(Some(task)),
            cancel,
        }
    }

    /// Offer an encoded frame. Dropped unless the connection is open and no
    /// other frame is awaiting its reply.
    pub fn send(&self, frame: EncodedFrame) -> SendOutcome {
        let state = self.shared.state.read();
        if !state.accepts_frames() {
            return SendOutcome::NotOpen;
        }
        if !self.shared.gate.try_mark() {
            return SendOutcome::InFlight;
        }
        match self.outbound.try_send(frame) {
            Ok(()) => SendOutcome::Accepted,
            Err(e) => {
                // Only reachable if the socket task has exited
                debug!("Outbound hand-off failed: {}", e);
                self.shared.gate.clear();
                SendOutcome::NotOpen
            }
        }
    }

    /// Open with nothing in flight
    pub fn is_ready(&self) -> bool {
        let state = self.shared.state.read();
        state.accepts_frames() && !self.shared.gate.is_in_flight()
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.read()
    }

    pub fn is_in_flight(&self) -> bool {
        self.shared.gate.is_in_flight()
    }

    /// Close the socket and stop reconnecting
    pub async fn close(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(mut task) = task {
            match timeout(SHUTDOWN_TIMEOUT, &mut task).await {
                Ok(Ok(())) => info!("Transport closed"),
                Ok(Err(e)) => error!("Transport task failed: {}", e),
                Err(_) => {
                    warn!("Transport did not close within {:?}, aborting", SHUTDOWN_TIMEOUT);
                    task.abort();
                    self.shared.set_state(ConnectionState::Disconnected);
                    self.shared.gate.clear();
                }
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() && self.task.lock().is_none()
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn supervise(
    shared: Arc<TransportShared>,
    connector: Arc<dyn Connector>,
    mut outbound: mpsc::Receiver<EncodedFrame>,
    reconnect_delay: Duration,
    connect_timeout: Duration,
    cancel: CancellationToken,
) {
    let mut connected_before = false;

    loop {
        shared.set_state(ConnectionState::Connecting);
        shared.stats.record_connection_attempt();

        let attempt = tokio::select! {
            _ = cancel.cancelled() => break,
            attempt = timeout(connect_timeout, connector.connect()) => attempt
                .unwrap_or(Err(TransportError::ConnectTimeout { timeout: connect_timeout })),
        };

        match attempt {
            Ok(connection) => {
                let connection_id = Uuid::new_v4();
                if connected_before {
                    shared.stats.record_reconnect();
                }
                connected_before = true;
                info!("Connected to {} ({})", connector.endpoint(), connection_id);

                shared.render.on_connected();
                shared.set_state(ConnectionState::Open);

                match run_connection(&shared, connection, &mut outbound, &cancel).await {
                    ConnectionEnd::Cancelled => {
                        info!("Connection {} closed", connection_id);
                        break;
                    }
                    ConnectionEnd::Lost(reason) => {
                        warn!("Connection {} lost: {}", connection_id, reason);
                    }
                }
            }
            Err(e) => warn!("Connect to {} failed: {}", connector.endpoint(), e),
        }

        shared.enter_disconnected(&mut outbound);

        debug!("Reconnecting in {:?}", reconnect_delay);
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(reconnect_delay) => {}
        }
    }

    shared.enter_disconnected(&mut outbound);
    debug!("Transport supervisor stopped");
}

async fn run_connection(
    shared: &TransportShared,
    connection: Connection,
    outbound: &mut mpsc::Receiver<EncodedFrame>,
    cancel: &CancellationToken,
) -> ConnectionEnd {
    let Connection {
        mut sink,
        mut stream,
    } = connection;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                shared.set_state(ConnectionState::Closing);
                if let Ok(Err(e)) = timeout(CLOSE_TIMEOUT, sink.close()).await {
                    debug!("Error closing socket: {}", e);
                }
                return ConnectionEnd::Cancelled;
            }

            inbound = stream.next() => match inbound {
                Some(Ok(message)) => {
                    let inbound = demux(message);
                    let acknowledged = inbound.acknowledges();
                    match inbound {
                        Inbound::ProcessedFrame(frame) => shared.on_processed_frame(frame),
                        Inbound::Metadata(metadata) => shared.on_metadata(metadata),
                        Inbound::Malformed(reason) => {
                            shared.stats.record_malformed();
                            debug!("Ignoring malformed message: {}", reason);
                        }
                        Inbound::Closed => {
                            return ConnectionEnd::Lost("closed by peer".to_string())
                        }
                        Inbound::Control => {}
                    }
                    // Cleared only after the reply has been applied
                    if acknowledged {
                        shared.gate.clear();
                    }
                }
                Some(Err(e)) => return ConnectionEnd::Lost(e.to_string()),
                None => return ConnectionEnd::Lost("stream ended".to_string()),
            },

            frame = outbound.recv() => match frame {
                Some(frame) => {
                    let len = frame.len();
                    if let Err(e) = sink.send(WireMessage::Binary(frame.data)).await {
                        return ConnectionEnd::Lost(e.to_string());
                    }
                    trace!("Sent frame {} ({} bytes)", frame.source_id, len);
                    shared.stats.record_sent(len);
                }
                None => return ConnectionEnd::Cancelled,
            },
        }
    }
}
