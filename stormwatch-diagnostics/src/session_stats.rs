//! Session statistics folded from the event stream

use serde::{Deserialize, Serialize};
use stormwatch_core::{ConnectionStatus, SessionEvent};

/// Counters describing one client session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticsReport {
    /// Successful device enumerations
    pub enumerations: u64,
    /// Failed device enumerations
    pub enumeration_failures: u64,
    /// Subscriptions opened
    pub subscriptions_opened: u64,
    /// Frames accepted into the state
    pub frames_accepted: u64,
    /// Frames accepted that carried threats
    pub threat_frames: u64,
    /// Malformed messages discarded
    pub messages_rejected: u64,
    /// Error reports pushed by the server
    pub server_reports: u64,
    /// Messages dropped because their subscription was superseded
    pub stale_drops: u64,
    /// Subscriptions that failed
    pub connection_failures: u64,
    /// Successful history polls
    pub history_updates: u64,
    /// Failed history polls
    pub history_failures: u64,
    /// Notifications delivered to the sink
    pub notifications: u64,
    /// Notifications the sink failed to render
    pub notification_failures: u64,
    /// Last reported connection status
    pub last_status: ConnectionStatus,
    /// Message of the last reported error
    pub last_error: Option<String>,
}

/// Accumulates a [`DiagnosticsReport`] from [`SessionEvent`]s
#[derive(Debug, Default)]
pub struct SessionDiagnostics {
    report: DiagnosticsReport,
}

impl SessionDiagnostics {
    /// Create empty diagnostics
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the counters
    pub fn record(&mut self, event: &SessionEvent) {
        let report = &mut self.report;
        match event {
            SessionEvent::DevicesEnumerated { .. } => report.enumerations += 1,
            SessionEvent::DeviceEnumerationFailed { .. } => report.enumeration_failures += 1,
            SessionEvent::SubscriptionOpened { .. } => report.subscriptions_opened += 1,
            SessionEvent::SubscriptionClosed { .. } => {}
            SessionEvent::ConnectionChanged { status, .. } => report.last_status = *status,
            SessionEvent::ConnectionFailed { .. } => report.connection_failures += 1,
            SessionEvent::FrameAccepted { threat_count, .. } => {
                report.frames_accepted += 1;
                if *threat_count > 0 {
                    report.threat_frames += 1;
                }
            }
            SessionEvent::MessageRejected { .. } => report.messages_rejected += 1,
            SessionEvent::ServerReported { message, .. } => {
                report.server_reports += 1;
                report.last_error = Some(message.clone());
            }
            SessionEvent::StaleMessageDropped { .. } => report.stale_drops += 1,
            SessionEvent::ThreatNotified { .. } => report.notifications += 1,
            SessionEvent::NotificationFailed { .. } => report.notification_failures += 1,
            SessionEvent::HistoryUpdated { .. } => report.history_updates += 1,
            SessionEvent::HistoryFetchFailed { .. } => report.history_failures += 1,
        }

        if let Some(error) = event.error() {
            report.last_error = Some(error.to_string());
        }
    }

    /// Current counters
    pub fn report(&self) -> &DiagnosticsReport {
        &self.report
    }

    /// Counters as JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.report)
    }

    /// One-line human summary
    pub fn summary(&self) -> String {
        let r = &self.report;
        format!(
            "status={} frames={} threats={} rejected={} stale={} failures={} history={}/{} notified={}",
            r.last_status,
            r.frames_accepted,
            r.threat_frames,
            r.messages_rejected,
            r.stale_drops,
            r.connection_failures,
            r.history_updates,
            r.history_updates + r.history_failures,
            r.notifications,
        )
    }

    /// Forget everything recorded so far
    pub fn reset(&mut self) {
        self.report = DiagnosticsReport::default();
    }
}
