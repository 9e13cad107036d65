//! Threat notifications
//!
//! [`NotificationTrigger`] observes accepted frames and invokes a
//! [`NotificationSink`] once per frame carrying threats, unless muted at that
//! moment. There is no de-duplication or rate limiting: a sustained run of
//! threat frames notifies on every frame.

use crate::error::StormwatchError;
use crate::event::{EventReporter, SessionEvent};
use crate::model::{Epoch, StreamFrame};
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// What a sink is asked to render
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreatAlert {
    /// Device the frame came from
    pub device_id: String,
    /// Epoch of the subscription that delivered the frame
    pub epoch: Epoch,
    /// Threat labels on the frame
    pub threats: Vec<String>,
}

impl ThreatAlert {
    /// One-line summary, e.g. `Threat Detected: weapon, fight`
    pub fn summary(&self) -> String {
        format!("Threat Detected: {}", self.threats.join(", "))
    }
}

/// Side-effecting capability that renders an alert
pub trait NotificationSink: Send + Sync {
    /// Render the alert
    fn notify(&self, alert: &ThreatAlert) -> Result<(), StormwatchError>;
}

/// Sink that logs alerts through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, alert: &ThreatAlert) -> Result<(), StormwatchError> {
        warn!(device_id = %alert.device_id, epoch = %alert.epoch, "{}", alert.summary());
        Ok(())
    }
}

/// Sink that rings the terminal bell on stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalBellSink;

impl NotificationSink for TerminalBellSink {
    fn notify(&self, alert: &ThreatAlert) -> Result<(), StormwatchError> {
        let mut stderr = std::io::stderr().lock();
        writeln!(stderr, "\x07{}", alert.summary())
            .and_then(|_| stderr.flush())
            .map_err(|e| StormwatchError::Notification {
                reason: format!("terminal bell failed: {}", e),
            })
    }
}

/// Fires the notification sink for accepted frames carrying threats
pub struct NotificationTrigger {
    sink: Arc<dyn NotificationSink>,
    events: EventReporter,
    fired: AtomicU64,
}

impl NotificationTrigger {
    /// Create a trigger around a sink
    pub fn new(sink: Arc<dyn NotificationSink>, events: EventReporter) -> Self {
        Self {
            sink,
            events,
            fired: AtomicU64::new(0),
        }
    }

    /// Observe one accepted frame; `muted` is the mute flag at the moment the frame was accepted.
    ///
    /// Returns whether the sink was invoked.
    pub fn observe(&self, device_id: &str, epoch: Epoch, frame: &StreamFrame, muted: bool) -> bool {
        if !frame.has_threats() {
            return false;
        }
        if muted {
            debug!(device_id, %epoch, "Threats detected while muted, notification suppressed");
            return false;
        }

        let alert = ThreatAlert {
            device_id: device_id.to_string(),
            epoch,
            threats: frame.threats.iter().map(|t| t.label.clone()).collect(),
        };
        self.fired.fetch_add(1, Ordering::Relaxed);

        match self.sink.notify(&alert) {
            Ok(()) => self.events.report(SessionEvent::ThreatNotified {
                threats: alert.threats,
            }),
            Err(error) => {
                warn!(device_id, "Notification sink failed: {}", error);
                self.events
                    .report(SessionEvent::NotificationFailed { error });
            }
        }
        true
    }

    /// Number of times the sink has been invoked
    pub fn fired(&self) -> u64 {
        self.fired.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for NotificationTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationTrigger")
            .field("fired", &self.fired())
            .finish_non_exhaustive()
    }
}
