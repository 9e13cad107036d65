//! Session events: the observability path of every component

use crate::error::StormwatchError;
use crate::model::Epoch;
use crate::state::ConnectionStatus;
use tokio::sync::mpsc;
use tracing::trace;

/// Something observable that happened during a session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Device enumeration finished
    DevicesEnumerated {
        /// Number of video inputs found
        count: usize,
    },
    /// Device enumeration failed; the device list is empty
    DeviceEnumerationFailed {
        /// The reported error
        error: StormwatchError,
    },
    /// A subscription was requested for a device
    SubscriptionOpened {
        /// Device id
        device_id: String,
        /// Epoch of the subscription
        epoch: Epoch,
    },
    /// A subscription was torn down on request
    SubscriptionClosed {
        /// Device id
        device_id: String,
        /// Epoch of the subscription
        epoch: Epoch,
    },
    /// The subscription status changed
    ConnectionChanged {
        /// Epoch of the subscription
        epoch: Epoch,
        /// New status
        status: ConnectionStatus,
    },
    /// The subscription failed; no automatic reconnection follows
    ConnectionFailed {
        /// Epoch of the subscription
        epoch: Epoch,
        /// The reported error
        error: StormwatchError,
    },
    /// A frame was accepted into the session state
    FrameAccepted {
        /// Epoch of the subscription
        epoch: Epoch,
        /// Number of threats on the frame
        threat_count: usize,
    },
    /// A pushed message failed validation and was discarded
    MessageRejected {
        /// Epoch of the subscription
        epoch: Epoch,
        /// The reported error
        error: StormwatchError,
    },
    /// The server pushed an error report on the stream
    ServerReported {
        /// Epoch of the subscription
        epoch: Epoch,
        /// Message sent by the server
        message: String,
    },
    /// A message from a superseded subscription was discarded
    StaleMessageDropped {
        /// Epoch the message belonged to
        message_epoch: Epoch,
        /// Epoch current at delivery time
        current_epoch: Epoch,
    },
    /// The notification sink was invoked
    ThreatNotified {
        /// Threat labels that triggered the notification
        threats: Vec<String>,
    },
    /// The notification sink failed
    NotificationFailed {
        /// The reported error
        error: StormwatchError,
    },
    /// The history snapshot was replaced
    HistoryUpdated {
        /// Number of entries in the new snapshot
        entries: usize,
    },
    /// A history poll failed; the previous snapshot is kept
    HistoryFetchFailed {
        /// The reported error
        error: StormwatchError,
    },
}

impl SessionEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::DevicesEnumerated { .. } => "devices_enumerated",
            SessionEvent::DeviceEnumerationFailed { .. } => "device_enumeration_failed",
            SessionEvent::SubscriptionOpened { .. } => "subscription_opened",
            SessionEvent::SubscriptionClosed { .. } => "subscription_closed",
            SessionEvent::ConnectionChanged { .. } => "connection_changed",
            SessionEvent::ConnectionFailed { .. } => "connection_failed",
            SessionEvent::FrameAccepted { .. } => "frame_accepted",
            SessionEvent::MessageRejected { .. } => "message_rejected",
            SessionEvent::ServerReported { .. } => "server_reported",
            SessionEvent::StaleMessageDropped { .. } => "stale_message_dropped",
            SessionEvent::ThreatNotified { .. } => "threat_notified",
            SessionEvent::NotificationFailed { .. } => "notification_failed",
            SessionEvent::HistoryUpdated { .. } => "history_updated",
            SessionEvent::HistoryFetchFailed { .. } => "history_fetch_failed",
        }
    }

    /// Check if this event concerns the live stream
    pub fn is_stream_event(&self) -> bool {
        matches!(
            self,
            SessionEvent::SubscriptionOpened { .. }
                | SessionEvent::SubscriptionClosed { .. }
                | SessionEvent::ConnectionChanged { .. }
                | SessionEvent::ConnectionFailed { .. }
                | SessionEvent::FrameAccepted { .. }
                | SessionEvent::MessageRejected { .. }
                | SessionEvent::ServerReported { .. }
                | SessionEvent::StaleMessageDropped { .. }
        )
    }

    /// Check if this event concerns the history poller
    pub fn is_history_event(&self) -> bool {
        matches!(
            self,
            SessionEvent::HistoryUpdated { .. } | SessionEvent::HistoryFetchFailed { .. }
        )
    }

    /// Check if this event concerns device enumeration
    pub fn is_device_event(&self) -> bool {
        matches!(
            self,
            SessionEvent::DevicesEnumerated { .. } | SessionEvent::DeviceEnumerationFailed { .. }
        )
    }

    /// Check if this event concerns notifications
    pub fn is_notification_event(&self) -> bool {
        matches!(
            self,
            SessionEvent::ThreatNotified { .. } | SessionEvent::NotificationFailed { .. }
        )
    }

    /// The reported error, if this event carries one
    pub fn error(&self) -> Option<&StormwatchError> {
        match self {
            SessionEvent::DeviceEnumerationFailed { error }
            | SessionEvent::ConnectionFailed { error, .. }
            | SessionEvent::MessageRejected { error, .. }
            | SessionEvent::NotificationFailed { error }
            | SessionEvent::HistoryFetchFailed { error } => Some(error),
            _ => None,
        }
    }

    /// Check if this is an error event
    pub fn is_error_event(&self) -> bool {
        self.error().is_some()
    }
}

/// Sending half of the event channel, shared by all components
#[derive(Debug, Clone)]
pub struct EventReporter {
    sender: Option<mpsc::UnboundedSender<SessionEvent>>,
}

impl EventReporter {
    /// Create a reporter and the receiver its events go to
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// A reporter that drops every event
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    /// Publish an event; a dropped receiver is not an error
    pub fn report(&self, event: SessionEvent) {
        if let Some(sender) = &self.sender {
            if sender.send(event).is_err() {
                trace!("Event receiver dropped");
            }
        }
    }
}

impl Default for EventReporter {
    fn default() -> Self {
        Self::disabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_classification() {
        let frame = SessionEvent::FrameAccepted {
            epoch: Epoch(1),
            threat_count: 0,
        };
        assert!(frame.is_stream_event());
        assert!(!frame.is_history_event());
        assert!(!frame.is_error_event());

        let failed = SessionEvent::HistoryFetchFailed {
            error: StormwatchError::HistoryFetch {
                reason: "HTTP 500".to_string(),
                status: Some(500),
            },
        };
        assert!(failed.is_history_event());
        assert!(failed.is_error_event());
        assert_eq!(failed.event_type(), "history_fetch_failed");

        let devices = SessionEvent::DevicesEnumerated { count: 2 };
        assert!(devices.is_device_event());
        assert!(!devices.is_notification_event());
    }

    #[tokio::test]
    async fn test_reporter_delivers_events() {
        let (reporter, mut receiver) = EventReporter::channel();
        reporter.report(SessionEvent::HistoryUpdated { entries: 3 });

        let event = receiver.recv().await.unwrap();
        assert_eq!(event, SessionEvent::HistoryUpdated { entries: 3 });
    }

    #[test]
    fn test_reporter_tolerates_dropped_receiver() {
        let (reporter, receiver) = EventReporter::channel();
        drop(receiver);
        reporter.report(SessionEvent::DevicesEnumerated { count: 0 });
        EventReporter::disabled().report(SessionEvent::DevicesEnumerated { count: 0 });
    }
}
