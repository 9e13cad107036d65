//! Data model shared by every Stormwatch component

use crate::error::StormwatchError;
use base64::engine::general_purpose::STANDARD as BASE64_ENGINE;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of id characters used when a device has no label
const FALLBACK_LABEL_ID_CHARS: usize = 8;

/// Kind of a device reported by the capture device provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Camera or other video source
    VideoInput,
    /// Microphone
    AudioInput,
    /// Speaker or headset
    AudioOutput,
    /// Anything the provider reports that we do not classify
    Other(String),
}

impl DeviceKind {
    /// Parse a host kind string such as `videoinput`
    pub fn from_host(kind: &str) -> Self {
        match kind.to_ascii_lowercase().as_str() {
            "videoinput" | "video" => DeviceKind::VideoInput,
            "audioinput" => DeviceKind::AudioInput,
            "audiooutput" => DeviceKind::AudioOutput,
            other => DeviceKind::Other(other.to_string()),
        }
    }
}

/// Raw device record as returned by the provider, before filtering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Opaque device identifier
    pub id: String,
    /// Device kind
    pub kind: DeviceKind,
    /// Display name, may be empty
    pub label: String,
}

impl DeviceInfo {
    /// Convenience constructor for a video input
    pub fn video(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: DeviceKind::VideoInput,
            label: label.into(),
        }
    }
}

/// A video input device that can be subscribed to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptureDevice {
    /// Opaque device identifier
    pub id: String,
    /// Display name, may be empty
    pub label: String,
}

impl CaptureDevice {
    /// Create a capture device
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }

    /// Label to show to a user; unlabelled devices are named after their id
    pub fn display_name(&self) -> String {
        if !self.label.trim().is_empty() {
            return self.label.clone();
        }
        let short: String = self.id.chars().take(FALLBACK_LABEL_ID_CHARS).collect();
        format!("Camera {}", short)
    }
}

impl From<DeviceInfo> for CaptureDevice {
    fn from(info: DeviceInfo) -> Self {
        Self {
            id: info.id,
            label: info.label,
        }
    }
}

/// A labelled detection attached to a frame or a history entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreatEvent {
    /// Threat identifier as sent by the Detection Server
    pub label: String,
}

impl ThreatEvent {
    /// Create a threat event
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }

    /// Upper-cased label for display
    pub fn display_label(&self) -> String {
        self.label.to_uppercase()
    }

    /// Case-insensitive comparison against a label
    pub fn matches(&self, label: &str) -> bool {
        self.label.eq_ignore_ascii_case(label)
    }
}

impl fmt::Display for ThreatEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

impl From<&str> for ThreatEvent {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

/// Encoded image payload exactly as pushed by the server
///
/// The client never decodes pixels; the payload is carried opaquely and can be
/// turned into bytes or a data URI for whoever renders it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedImage(String);

impl EncodedImage {
    /// Wrap an encoded payload
    pub fn new(payload: impl Into<String>) -> Self {
        Self(payload.into())
    }

    /// The encoded payload
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length of the encoded payload in bytes
    pub fn encoded_len(&self) -> usize {
        self.0.len()
    }

    /// Decode the base64 payload into raw image bytes
    pub fn decode(&self) -> Result<Vec<u8>, StormwatchError> {
        BASE64_ENGINE
            .decode(self.0.as_bytes())
            .map_err(|e| StormwatchError::decode(format!("image payload is not base64: {}", e)))
    }

    /// `data:` URI for a JPEG payload
    pub fn data_uri(&self) -> String {
        format!("data:image/jpeg;base64,{}", self.0)
    }
}

impl PartialEq<&str> for EncodedImage {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// One pushed frame and its threat annotations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFrame {
    /// Encoded image payload
    pub image: EncodedImage,
    /// Threat labels in server order
    pub threats: Vec<ThreatEvent>,
}

impl StreamFrame {
    /// Create a frame from an encoded payload and threat labels
    pub fn new<I, S>(image: impl Into<String>, threats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            image: EncodedImage::new(image),
            threats: threats.into_iter().map(ThreatEvent::new).collect(),
        }
    }

    /// Whether the frame carries any threat
    pub fn has_threats(&self) -> bool {
        !self.threats.is_empty()
    }

    /// Threat labels as plain strings
    pub fn threat_labels(&self) -> Vec<&str> {
        self.threats.iter().map(|t| t.label.as_str()).collect()
    }
}

/// A persisted alert record owned by the Detection Server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertLogEntry {
    /// Unique record id
    pub id: String,
    /// When the alert was logged
    pub timestamp: DateTime<Utc>,
    /// Threat labels recorded with the alert
    pub threats: Vec<ThreatEvent>,
}

/// Tag distinguishing successive subscriptions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Epoch(pub u64);

impl Epoch {
    /// The epoch that follows this one
    pub fn next(self) -> Self {
        Epoch(self.0 + 1)
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
