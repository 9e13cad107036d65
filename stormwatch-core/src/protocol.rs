//! Wire formats spoken by the Detection Server
//!
//! Two payloads cross the wire:
//!
//! - pushed stream messages: `{ "image": "<base64>", "threats": ["weapon", ...] }`,
//!   or `{ "error": "..." }` when the server gives up on a stream;
//! - the history query result: `[{ "id": .., "timestamp": "..", "threats": [..] }, ...]`.
//!
//! Decoding validates required fields; anything that fails validation is a
//! [`StormwatchError::MessageDecode`] (stream) or [`StormwatchError::HistoryFetch`]
//! (history) and never produces partial state.

use crate::error::StormwatchError;
use crate::model::{AlertLogEntry, EncodedImage, StreamFrame, ThreatEvent};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;

/// A decoded pushed message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamMessage {
    /// A frame with its threat annotations
    Frame(StreamFrame),
    /// The server reported a failure on this stream
    ServerError(String),
}

#[derive(Debug, Deserialize)]
struct WireStreamMessage {
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    threats: Option<Vec<String>>,
    #[serde(default)]
    error: Option<String>,
}

/// Decode one pushed text message
pub fn decode_stream_message(text: &str) -> Result<StreamMessage, StormwatchError> {
    let wire: WireStreamMessage = serde_json::from_str(text)
        .map_err(|e| StormwatchError::decode(format!("invalid stream message: {}", e)))?;

    if wire.image.is_none() && wire.threats.is_none() {
        if let Some(error) = wire.error {
            return Ok(StreamMessage::ServerError(error));
        }
    }

    let image = wire
        .image
        .ok_or_else(|| StormwatchError::decode("missing field `image`"))?;
    if image.is_empty() {
        return Err(StormwatchError::decode("empty `image` payload"));
    }
    let threats = wire
        .threats
        .ok_or_else(|| StormwatchError::decode("missing field `threats`"))?;

    Ok(StreamMessage::Frame(StreamFrame {
        image: EncodedImage::new(image),
        threats: threats.into_iter().map(ThreatEvent::new).collect(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireId {
    Text(String),
    Number(serde_json::Number),
}

impl WireId {
    fn into_string(self) -> String {
        match self {
            WireId::Text(text) => text,
            WireId::Number(number) => number.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireAlertLogEntry {
    id: WireId,
    timestamp: String,
    threats: Vec<String>,
}

/// Decode a full history query result
pub fn decode_history(body: &str) -> Result<Vec<AlertLogEntry>, StormwatchError> {
    let wire: Vec<WireAlertLogEntry> = serde_json::from_str(body)
        .map_err(|e| StormwatchError::history(format!("invalid history payload: {}", e)))?;

    wire.into_iter()
        .map(|entry| {
            let timestamp = parse_timestamp(&entry.timestamp)?;
            Ok(AlertLogEntry {
                id: entry.id.into_string(),
                timestamp,
                threats: entry.threats.into_iter().map(ThreatEvent::new).collect(),
            })
        })
        .collect()
}

/// Parse an ISO-8601 timestamp; values without an offset are taken as UTC
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StormwatchError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    Err(StormwatchError::history(format!(
        "invalid timestamp `{}`",
        raw
    )))
}
