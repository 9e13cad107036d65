//! Error types for Stormwatch

use thiserror::Error;

/// Main error type for Stormwatch operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StormwatchError {
    /// The capture device provider denied access or is unavailable
    #[error("Device enumeration failed: {reason}")]
    DeviceEnumeration {
        /// Reason reported by the provider
        reason: String,
    },

    /// A stream subscription failed to open, errored, or was closed remotely
    #[error("Connection failed for device {device_id}: {reason}")]
    Connection {
        /// Device the subscription was bound to
        device_id: String,
        /// Reason for connection failure
        reason: String,
    },

    /// A pushed message was malformed or incomplete
    #[error("Message decode failed: {reason}")]
    MessageDecode {
        /// Reason the message was rejected
        reason: String,
    },

    /// The history query failed or returned an invalid shape
    #[error("History fetch failed: {reason}")]
    HistoryFetch {
        /// Reason for the failure
        reason: String,
        /// HTTP status, when the server answered
        status: Option<u16>,
    },

    /// The notification sink could not render an alert
    #[error("Notification failed: {reason}")]
    Notification {
        /// Reason reported by the sink
        reason: String,
    },

    /// Invalid configuration value
    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfiguration {
        /// Offending configuration field
        field: String,
        /// Why the value was rejected
        reason: String,
    },

    /// Missing configuration error
    #[error("Missing required configuration: {field}")]
    MissingConfiguration {
        /// Missing configuration field
        field: String,
    },
}

impl StormwatchError {
    /// Get error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            StormwatchError::DeviceEnumeration { .. } => "DEVICE_ENUMERATION_FAILED",
            StormwatchError::Connection { .. } => "CONNECTION_FAILED",
            StormwatchError::MessageDecode { .. } => "MESSAGE_DECODE_FAILED",
            StormwatchError::HistoryFetch { .. } => "HISTORY_FETCH_FAILED",
            StormwatchError::Notification { .. } => "NOTIFICATION_FAILED",
            StormwatchError::InvalidConfiguration { .. } => "INVALID_CONFIGURATION",
            StormwatchError::MissingConfiguration { .. } => "MISSING_CONFIGURATION",
        }
    }

    /// Whether the system keeps running in its last-known-good state after this error.
    ///
    /// Only configuration errors stop a component from being built at all.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            StormwatchError::InvalidConfiguration { .. }
                | StormwatchError::MissingConfiguration { .. }
        )
    }

    pub(crate) fn decode(reason: impl Into<String>) -> Self {
        StormwatchError::MessageDecode {
            reason: reason.into(),
        }
    }

    pub(crate) fn history(reason: impl Into<String>) -> Self {
        StormwatchError::HistoryFetch {
            reason: reason.into(),
            status: None,
        }
    }
}
