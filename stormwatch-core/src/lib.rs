//! # Stormwatch Core
//!
//! Shared vocabulary of the Stormwatch monitoring client: the data model, the
//! Detection Server wire formats, the observable session state, session
//! events, the notification trigger and the error type every component returns.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod event;
pub mod model;
pub mod notification;
pub mod protocol;
pub mod state;

// Re-export main types
pub use config::DetectionServerConfig;
pub use error::StormwatchError;
pub use event::{EventReporter, SessionEvent};
pub use model::{
    AlertLogEntry, CaptureDevice, DeviceInfo, DeviceKind, EncodedImage, Epoch, StreamFrame,
    ThreatEvent,
};
pub use notification::{LogSink, NotificationSink, NotificationTrigger, TerminalBellSink, ThreatAlert};
pub use protocol::{decode_history, decode_stream_message, StreamMessage};
pub use state::{ConnectionStatus, SessionState, SessionStore, Theme};
