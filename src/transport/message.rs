use crate::render::RiskLevel;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_tungstenite::tungstenite::Message;

/// A socket message reduced to the kinds the pipeline distinguishes
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    Binary(Bytes),
    Text(String),
    Close,
    /// Ping, pong and raw frames; handled by the socket layer
    Control,
}

impl From<Message> for WireMessage {
    fn from(message: Message) -> Self {
        match message {
            Message::Binary(data) => WireMessage::Binary(Bytes::from(data)),
            Message::Text(text) => WireMessage::Text(text),
            Message::Close(_) => WireMessage::Close,
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => WireMessage::Control,
        }
    }
}

impl From<WireMessage> for Message {
    fn from(message: WireMessage) -> Self {
        match message {
            WireMessage::Binary(data) => Message::Binary(data.to_vec()),
            WireMessage::Text(text) => Message::Text(text),
            WireMessage::Close => Message::Close(None),
            WireMessage::Control => Message::Pong(Vec::new()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Detections {
    #[serde(default)]
    pub person_count: u32,
    #[serde(default)]
    pub object_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weapon_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertInfo {
    pub level: String,
}

/// Inference result for one frame. Replaces the previous record in full.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InboundMetadata {
    pub detections: Detections,
    pub risk_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<AlertInfo>,
}

#[derive(Debug, Error, PartialEq)]
pub enum MetadataError {
    #[error("not a metadata record: {0}")]
    Json(String),

    #[error("record carries no detections, risk score or error")]
    Empty,

    #[error("risk score {0} outside [0, 100]")]
    RiskOutOfRange(f64),
}

#[derive(Deserialize)]
struct RawMetadata {
    detections: Option<Detections>,
    risk_score: Option<f64>,
    error: Option<String>,
    alert: Option<AlertInfo>,
}

impl InboundMetadata {
    /// Parse and validate a textual metadata payload.
    ///
    /// A record with only `error` is valid and reads as zero counts and
    /// score 0.
    pub fn parse(text: &str) -> Result<Self, MetadataError> {
        let raw: RawMetadata =
            serde_json::from_str(text).map_err(|e| MetadataError::Json(e.to_string()))?;

        if raw.detections.is_none() && raw.risk_score.is_none() && raw.error.is_none() {
            return Err(MetadataError::Empty);
        }

        let risk_score = raw.risk_score.unwrap_or(0.0);
        if !risk_score.is_finite() || !(0.0..=100.0).contains(&risk_score) {
            return Err(MetadataError::RiskOutOfRange(risk_score));
        }

        Ok(Self {
            detections: raw.detections.unwrap_or_default(),
            risk_score,
            error: raw.error,
            alert: raw.alert,
        })
    }

    pub fn risk_level(&self) -> RiskLevel {
        RiskLevel::from_score(self.risk_score)
    }
}

/// What an inbound message means to the pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    ProcessedFrame(Bytes),
    Metadata(InboundMetadata),
    /// Neither a frame nor valid metadata; ignored
    Malformed(String),
    Closed,
    Control,
}

impl Inbound {
    /// Whether this message acknowledges the frame in flight
    pub fn acknowledges(&self) -> bool {
        matches!(self, Inbound::ProcessedFrame(_) | Inbound::Metadata(_))
    }
}

/// Classify an inbound message by payload shape.
pub fn demux(message: WireMessage) -> Inbound {
    match message {
        WireMessage::Binary(data) if data.is_empty() => {
            Inbound::Malformed("empty binary payload".to_string())
        }
        WireMessage::Binary(data) => Inbound::ProcessedFrame(data),
        WireMessage::Text(text) => match InboundMetadata::parse(&text) {
            Ok(metadata) => Inbound::Metadata(metadata),
            Err(e) => Inbound::Malformed(e.to_string()),
        },
        WireMessage::Close => Inbound::Closed,
        WireMessage::Control => Inbound::Control,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_is_processed_frame() {
        let inbound = demux(WireMessage::Binary(Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xD9])));
        assert!(matches!(inbound, Inbound::ProcessedFrame(ref b) if b.len() == 4));
        assert!(inbound.acknowledges());
    }

    #[test]
    fn test_text_is_metadata() {
        let text = r#"{"detections":{"person_count":2,"object_count":1},"risk_score":82}"#;
        let Inbound::Metadata(metadata) = demux(WireMessage::Text(text.to_string())) else {
            panic!("expected metadata");
        };
        assert_eq!(metadata.detections.person_count, 2);
        assert_eq!(metadata.detections.object_count, 1);
        assert_eq!(metadata.risk_score, 82.0);
        assert_eq!(metadata.risk_level(), RiskLevel::Critical);
    }

    #[test]
    fn test_metadata_extras_are_kept() {
        let text = r#"{"detections":{"person_count":1,"object_count":0,"weapon_count":1},
                       "risk_score":91.5,"alert":{"level":"CRITICAL"}}"#;
        let metadata = InboundMetadata::parse(text).unwrap();
        assert_eq!(metadata.detections.weapon_count, Some(1));
        assert_eq!(metadata.alert.unwrap().level, "CRITICAL");
    }

    #[test]
    fn test_error_only_reply_is_valid() {
        let metadata = InboundMetadata::parse(r#"{"error":"Models still loading"}"#).unwrap();
        assert_eq!(metadata.detections, Detections::default());
        assert_eq!(metadata.risk_score, 0.0);
        assert_eq!(metadata.error.as_deref(), Some("Models still loading"));
    }

    #[test]
    fn test_malformed_payloads() {
        for text in [
            "not json",
            "[1,2,3]",
            "{}",
            r#"{"risk_score":140}"#,
            r#"{"risk_score":-1}"#,
            r#"{"detections":{"person_count":-2,"object_count":0},"risk_score":10}"#,
        ] {
            let inbound = demux(WireMessage::Text(text.to_string()));
            assert!(matches!(inbound, Inbound::Malformed(_)), "accepted {}", text);
            assert!(!inbound.acknowledges());
        }

        assert!(matches!(
            demux(WireMessage::Binary(Bytes::new())),
            Inbound::Malformed(_)
        ));
    }

    #[test]
    fn test_tungstenite_conversion() {
        assert_eq!(
            WireMessage::from(Message::Binary(vec![1, 2])),
            WireMessage::Binary(Bytes::from_static(&[1, 2]))
        );
        assert_eq!(WireMessage::from(Message::Ping(vec![])), WireMessage::Control);
        assert!(matches!(Message::from(WireMessage::Close), Message::Close(None)));
    }
}
