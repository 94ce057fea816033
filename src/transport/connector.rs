use super::message::WireMessage;
use crate::error::TransportError;
use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::pin::Pin;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

pub type WireSink = Pin<Box<dyn Sink<WireMessage, Error = TransportError> + Send>>;
pub type WireStream = Pin<Box<dyn Stream<Item = Result<WireMessage, TransportError>> + Send>>;

/// Both halves of one established connection
pub struct Connection {
    pub sink: WireSink,
    pub stream: WireStream,
}

/// Opens duplex connections to the inference service
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Connection, TransportError>;

    /// Human-readable endpoint for logs
    fn endpoint(&self) -> String;
}

/// WebSocket connection to the inference service
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(url: &str) -> Result<Self, TransportError> {
        let parsed = url::Url::parse(url).map_err(|e| TransportError::InvalidUrl {
            url: url.to_string(),
            details: e.to_string(),
        })?;
        match parsed.scheme() {
            "ws" | "wss" => Ok(Self {
                url: parsed.to_string(),
            }),
            other => Err(TransportError::InvalidUrl {
                url: url.to_string(),
                details: format!("unsupported scheme '{}'", other),
            }),
        }
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<Connection, TransportError> {
        let (socket, response) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::Connect {
                url: self.url.clone(),
                details: e.to_string(),
            })?;
        debug!("WebSocket handshake with {} -> {}", self.url, response.status());

        let (sink, stream) = socket.split();
        let sink = sink
            .sink_map_err(TransportError::from)
            .with(|message: WireMessage| {
                futures::future::ready(Ok::<Message, TransportError>(message.into()))
            });
        let stream = stream.map(|item| item.map(WireMessage::from).map_err(TransportError::from));

        Ok(Connection {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_url_validation() {
        assert!(WebSocketConnector::new("ws://localhost:8000/ws/live-feed").is_ok());
        assert!(WebSocketConnector::new("wss://inference.example/ws").is_ok());
        assert!(matches!(
            WebSocketConnector::new("http://localhost:8000"),
            Err(TransportError::InvalidUrl { .. })
        ));
        assert!(matches!(
            WebSocketConnector::new("not a url"),
            Err(TransportError::InvalidUrl { .. })
        ));
    }
}
