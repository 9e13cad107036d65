//! The single authoritative session state and its store
//!
//! Each field has exactly one writer:
//!
//! | Field | Writer |
//! |---|---|
//! | `devices` | device registry |
//! | `connection_status`, `current_frame` | stream session |
//! | `history_snapshot` | history poller |
//! | `selected_device_id`, `muted`, `reconnect_epoch`, `theme` | session controller |
//!
//! Writers mutate through [`SessionStore::update`], which runs the closure
//! under the store's write lock and wakes observers only when the closure
//! reports a change.

use crate::model::{AlertLogEntry, CaptureDevice, Epoch, StreamFrame};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Lifecycle of the live subscription
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionStatus {
    /// No device selected
    #[default]
    Idle,
    /// Subscription requested, nothing decoded yet
    Connecting,
    /// At least one message decoded
    Live,
    /// Explicitly torn down
    Closed,
    /// Transport error or remote close; needs a new device selection
    Failed,
}

impl ConnectionStatus {
    /// Whether a subscription may still deliver frames in this status
    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionStatus::Connecting | ConnectionStatus::Live)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionStatus::Idle => "idle",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Live => "live",
            ConnectionStatus::Closed => "closed",
            ConnectionStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Presentation theme toggle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Theme {
    /// Dark palette
    #[default]
    Dark,
    /// Light palette
    Light,
}

impl Theme {
    /// The other theme
    pub fn toggled(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }
}

/// Merged state of one client session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Video input devices found at enumeration
    pub devices: Vec<CaptureDevice>,
    /// Device the live subscription is bound to
    pub selected_device_id: Option<String>,
    /// Subscription lifecycle status
    pub connection_status: ConnectionStatus,
    /// Last successfully decoded frame of the current subscription
    pub current_frame: Option<StreamFrame>,
    /// Result of the last successful history poll
    pub history_snapshot: Vec<AlertLogEntry>,
    /// Whether audible notifications are suppressed
    pub muted: bool,
    /// Epoch of the current subscription
    pub reconnect_epoch: Epoch,
    /// Presentation theme
    pub theme: Theme,
}

/// Shared, observable holder of [`SessionState`]
#[derive(Debug, Clone)]
pub struct SessionStore {
    sender: Arc<watch::Sender<SessionState>>,
}

impl SessionStore {
    /// Create a store holding the given initial state
    pub fn new(initial: SessionState) -> Self {
        let (sender, _receiver) = watch::channel(initial);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Clone of the current state
    pub fn snapshot(&self) -> SessionState {
        self.sender.borrow().clone()
    }

    /// Read a projection of the current state without cloning all of it
    pub fn read<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
        f(&self.sender.borrow())
    }

    /// Mutate the state atomically; return `true` from the closure when it changed anything
    pub fn update(&self, f: impl FnOnce(&mut SessionState) -> bool) -> bool {
        self.sender.send_if_modified(f)
    }

    /// Receiver that is woken on every reported change
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.sender.subscribe()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SessionState::default())
    }
}
