//! Presentation projection of the session state
//!
//! [`ViewModel::project`] is a pure function of [`SessionState`]: any front end
//! (terminal, web bridge, native window) renders the same model, and the theme
//! is just another input.

use chrono::{TimeZone, Utc};
use serde::Serialize;
use std::fmt::Display;
use stormwatch_core::{ConnectionStatus, SessionState, Theme};

/// Feed placeholder shown until the first frame of a subscription arrives
pub const WAITING_FOR_INPUT: &str = "Waiting for camera input...";
/// Threat panel text for a frame without threats
pub const NO_THREATS: &str = "No threats detected";
/// History panel text for an empty snapshot
pub const NO_HISTORY: &str = "No threat history available";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One entry of the device picker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceOption {
    /// Device id
    pub id: String,
    /// Label shown to the operator
    pub label: String,
    /// Whether this is the selected device
    pub selected: bool,
}

/// The live feed panel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedView {
    /// No frame yet
    Waiting {
        /// Placeholder text
        message: String,
    },
    /// Latest frame
    Frame {
        /// `data:` URI of the frame image
        src: String,
    },
}

/// One row of the history panel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryRow {
    /// Record id
    pub id: String,
    /// Formatted timestamp
    pub time: String,
    /// Upper-cased threat labels
    pub threats: Vec<String>,
}

/// Everything a front end needs to draw one screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewModel {
    /// Active theme
    pub theme: Theme,
    /// Whether notifications are muted
    pub muted: bool,
    /// Subscription status
    pub status: ConnectionStatus,
    /// Device picker entries
    pub devices: Vec<DeviceOption>,
    /// Live feed
    pub feed: FeedView,
    /// Upper-cased threat labels of the latest frame
    pub threats: Vec<String>,
    /// Text shown instead of threat badges, when there are none
    pub threat_placeholder: Option<String>,
    /// History rows, newest first as delivered by the server
    pub history: Vec<HistoryRow>,
    /// Text shown instead of history rows, when there are none
    pub history_placeholder: Option<String>,
}

impl ViewModel {
    /// Project `state` with timestamps rendered in UTC
    pub fn project(state: &SessionState) -> Self {
        Self::project_in(state, &Utc)
    }

    /// Project `state` with timestamps rendered in `tz`
    pub fn project_in<Tz>(state: &SessionState, tz: &Tz) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let selected = state.selected_device_id.as_deref();
        let devices = state
            .devices
            .iter()
            .map(|device| DeviceOption {
                id: device.id.clone(),
                label: device.display_name(),
                selected: selected == Some(device.id.as_str()),
            })
            .collect();

        let (feed, threats) = match &state.current_frame {
            Some(frame) => (
                FeedView::Frame {
                    src: frame.image.data_uri(),
                },
                frame.threats.iter().map(|t| t.display_label()).collect::<Vec<_>>(),
            ),
            None => (
                FeedView::Waiting {
                    message: WAITING_FOR_INPUT.to_string(),
                },
                Vec::new(),
            ),
        };
        let threat_placeholder = threats.is_empty().then(|| NO_THREATS.to_string());

        let history: Vec<HistoryRow> = state
            .history_snapshot
            .iter()
            .map(|entry| HistoryRow {
                id: entry.id.clone(),
                time: entry
                    .timestamp
                    .with_timezone(tz)
                    .format(TIMESTAMP_FORMAT)
                    .to_string(),
                threats: entry.threats.iter().map(|t| t.display_label()).collect(),
            })
            .collect();
        let history_placeholder = history.is_empty().then(|| NO_HISTORY.to_string());

        Self {
            theme: state.theme,
            muted: state.muted,
            status: state.connection_status,
            devices,
            feed,
            threats,
            threat_placeholder,
            history,
            history_placeholder,
        }
    }

    /// Whether the threat panel should be drawn as an alert
    pub fn alerting(&self) -> bool {
        !self.threats.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use stormwatch_core::{decode_history, CaptureDevice, StreamFrame};

    fn populated_state() -> SessionState {
        SessionState {
            devices: vec![
                CaptureDevice::new("0123456789abcdef", ""),
                CaptureDevice::new("cam2", "Parking"),
            ],
            selected_device_id: Some("cam2".to_string()),
            connection_status: ConnectionStatus::Live,
            current_frame: Some(StreamFrame::new("QUJD", ["weapon", "Fight"])),
            history_snapshot: decode_history(
                r#"[{"id": 9, "timestamp": "2024-05-01T22:30:00Z", "threats": ["intruder"]}]"#,
            )
            .unwrap(),
            muted: true,
            theme: Theme::Light,
            ..SessionState::default()
        }
    }

    #[test]
    fn test_empty_state_placeholders() {
        let view = ViewModel::project(&SessionState::default());
        assert_eq!(
            view.feed,
            FeedView::Waiting {
                message: WAITING_FOR_INPUT.to_string()
            }
        );
        assert_eq!(view.threat_placeholder.as_deref(), Some(NO_THREATS));
        assert_eq!(view.history_placeholder.as_deref(), Some(NO_HISTORY));
        assert_eq!(view.theme, Theme::Dark);
        assert!(!view.alerting());
    }

    #[test]
    fn test_populated_projection() {
        let view = ViewModel::project(&populated_state());

        assert_eq!(view.devices[0].label, "Camera 01234567");
        assert!(!view.devices[0].selected);
        assert!(view.devices[1].selected);
        assert_eq!(
            view.feed,
            FeedView::Frame {
                src: "data:image/jpeg;base64,QUJD".to_string()
            }
        );
        assert_eq!(view.threats, vec!["WEAPON", "FIGHT"]);
        assert!(view.threat_placeholder.is_none());
        assert!(view.alerting());
        assert_eq!(view.history[0].time, "2024-05-01 22:30:00");
        assert_eq!(view.history[0].threats, vec!["INTRUDER"]);
        assert!(view.history_placeholder.is_none());
        assert!(view.muted);
        assert_eq!(view.theme, Theme::Light);
    }

    #[test]
    fn test_projection_in_timezone() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let view = ViewModel::project_in(&populated_state(), &tz);
        assert_eq!(view.history[0].time, "2024-05-02 00:30:00");
    }

    #[test]
    fn test_projection_is_pure() {
        let state = populated_state();
        assert_eq!(ViewModel::project(&state), ViewModel::project(&state));
    }
}
