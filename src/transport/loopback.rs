//! In-process connector whose server end is driven from the same process.
//!
//! Tests use it to script the inference service; `serve_echo` backs the
//! `--loopback` demo mode.

use super::connector::{Connection, Connector};
use super::message::WireMessage;
use crate::error::TransportError;
use async_trait::async_trait;
use futures::channel::mpsc as wire;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Client side of the loopback: hands each new connection to the acceptor
#[derive(Clone)]
pub struct LoopbackConnector {
    pending: mpsc::UnboundedSender<LoopbackPeer>,
    refuse: Arc<AtomicUsize>,
    stall: Arc<AtomicUsize>,
    attempts: Arc<AtomicUsize>,
}

/// Server side: yields one peer per established connection
pub struct LoopbackAcceptor {
    incoming: mpsc::UnboundedReceiver<LoopbackPeer>,
}

/// Server end of one connection
pub struct LoopbackPeer {
    tx: wire::UnboundedSender<WireMessage>,
    rx: wire::UnboundedReceiver<WireMessage>,
}

pub fn loopback() -> (LoopbackConnector, LoopbackAcceptor) {
    let (pending, incoming) = mpsc::unbounded_channel();
    (
        LoopbackConnector {
            pending,
            refuse: Arc::new(AtomicUsize::new(0)),
            stall: Arc::new(AtomicUsize::new(0)),
            attempts: Arc::new(AtomicUsize::new(0)),
        },
        LoopbackAcceptor { incoming },
    )
}

impl LoopbackConnector {
    /// Fail the next `count` connect attempts
    pub fn refuse_next(&self, count: usize) {
        self.refuse.store(count, Ordering::SeqCst);
    }

    /// Never complete the next `count` connect attempts, like a dial into a
    /// black-holed address
    pub fn stall_next(&self, count: usize) {
        self.stall.store(count, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for LoopbackConnector {
    async fn connect(&self) -> Result<Connection, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let stalled = self
            .stall
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stalled {
            debug!("Loopback connect attempt stalled");
            std::future::pending::<()>().await;
        }

        let refused = self
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(TransportError::Connect {
                url: self.endpoint(),
                details: "connection refused".to_string(),
            });
        }

        let (client_tx, server_rx) = wire::unbounded();
        let (server_tx, client_rx) = wire::unbounded();
        self.pending
            .send(LoopbackPeer {
                tx: server_tx,
                rx: server_rx,
            })
            .map_err(|_| TransportError::Connect {
                url: self.endpoint(),
                details: "no acceptor listening".to_string(),
            })?;

        Ok(Connection {
            sink: Box::pin(client_tx.sink_map_err(|_| TransportError::Closed)),
            stream: Box::pin(client_rx.map(Ok::<WireMessage, TransportError>)),
        })
    }

    fn endpoint(&self) -> String {
        "loopback".to_string()
    }
}

impl LoopbackAcceptor {
    pub async fn accept(&mut self) -> Option<LoopbackPeer> {
        self.incoming.recv().await
    }
}

impl LoopbackPeer {
    /// Next message from the client; `None` once the client hung up
    pub async fn recv(&mut self) -> Option<WireMessage> {
        self.rx.next().await
    }

    /// Returns false if the client is gone
    pub fn send(&self, message: WireMessage) -> bool {
        self.tx.unbounded_send(message).is_ok()
    }

    pub fn send_text(&self, text: &str) -> bool {
        self.send(WireMessage::Text(text.to_string()))
    }

    /// Drop the connection abruptly, the way a network failure would
    pub fn close(self) {
        self.tx.close_channel();
    }
}

/// Answer every frame with a metadata record followed by the frame itself.
pub async fn serve_echo(mut acceptor: LoopbackAcceptor, cancel: CancellationToken) {
    info!("Loopback inference peer ready");
    loop {
        let peer = tokio::select! {
            _ = cancel.cancelled() => break,
            peer = acceptor.accept() => match peer {
                Some(peer) => peer,
                None => break,
            },
        };
        tokio::spawn(echo_peer(peer, cancel.clone()));
    }
    debug!("Loopback inference peer stopped");
}

async fn echo_peer(mut peer: LoopbackPeer, cancel: CancellationToken) {
    let mut frames: u64 = 0;
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            message = peer.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };
        if let WireMessage::Binary(frame) = message {
            frames += 1;
            let reply = serde_json::json!({
                "detections": { "person_count": frames % 3, "object_count": frames % 2 },
                "risk_score": (frames * 7) % 100,
            });
            if !peer.send_text(&reply.to_string()) || !peer.send(WireMessage::Binary(frame)) {
                break;
            }
        }
    }
    debug!("Loopback peer finished after {} frame(s)", frames);
}
