//! # Stormwatch - Surveillance Monitoring Client Core
//!
//! Stormwatch is the headless core of a live surveillance monitor. It picks a
//! camera, subscribes to the Detection Server's analysed frame stream for that
//! camera, raises a notification whenever a frame carries threats, and keeps a
//! periodically refreshed copy of the server's alert history.
//!
//! ## Key Features
//!
//! - **Epoch-guarded subscriptions**: switching cameras can never let a late
//!   frame from the previous camera into the state
//! - **One observable state**: every component writes its own fields of a
//!   single [`SessionState`]; front ends render the pure [`ViewModel`]
//! - **Pluggable edges**: device enumeration, frame transport, history source
//!   and notification sink are traits with production and in-memory versions
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stormwatch::{ClientConfig, SessionController};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let controller = SessionController::builder()
//!         .config(ClientConfig::from_env()?)
//!         .start()
//!         .await?;
//!
//!     let mut events = controller.events();
//!     while let Some(event) = events.next().await {
//!         println!("{}: {:?}", event.event_type(), controller.view().threats);
//!     }
//!
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export core types for easy access
pub use stormwatch_core::{
    AlertLogEntry, CaptureDevice, ConnectionStatus, DetectionServerConfig, DeviceInfo, DeviceKind,
    EncodedImage, Epoch, LogSink, NotificationSink, SessionEvent, SessionState, StormwatchError,
    StreamFrame, TerminalBellSink, Theme, ThreatAlert, ThreatEvent,
};

pub use stormwatch_capture::{DeviceProvider, StaticDeviceProvider, UnavailableProvider};

pub use stormwatch_detection::{
    memory_transport, FrameTransport, HistorySource, HttpHistorySource, MemoryServer,
    MemoryTransport, WebSocketTransport,
};

#[cfg(feature = "diagnostics")]
pub use stormwatch_diagnostics::{
    init_logging, DiagnosticsReport, SessionDiagnostics, DEFAULT_LOG_DIRECTIVE,
};

// Public API modules
pub mod config;
pub mod controller;
pub mod event;
pub mod view;

// Re-export main API types
pub use config::ClientConfig;
pub use controller::{SessionController, SessionControllerBuilder};
pub use event::{EventFilter, EventStream, FilteredEventStream};
pub use view::{DeviceOption, FeedView, HistoryRow, ViewModel};
