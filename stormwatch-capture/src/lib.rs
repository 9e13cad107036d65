//! # Stormwatch Capture
//!
//! Capture device enumeration: the [`DeviceProvider`] seam over the host's
//! camera API and the [`DeviceRegistry`] that filters and publishes the list
//! of selectable video inputs.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod provider;
pub mod registry;

// Re-export main types
pub use provider::{platform_provider, DeviceProvider, StaticDeviceProvider, UnavailableProvider};
pub use registry::DeviceRegistry;
