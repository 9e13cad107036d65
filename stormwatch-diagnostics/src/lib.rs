//! # Stormwatch Diagnostics
//!
//! Logging setup and session diagnostics for Stormwatch.
//! Provides the tracing subscriber installation and counters folded from the
//! session event stream.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod logging;
pub mod session_stats;

// Re-export main types
pub use logging::{init_logging, DEFAULT_LOG_DIRECTIVE};
pub use session_stats::{DiagnosticsReport, SessionDiagnostics};
