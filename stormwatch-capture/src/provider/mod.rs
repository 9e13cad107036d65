//! Capture Device Providers
//!
//! A provider answers one question: which devices does the host have right
//! now. It is queried on demand only; nothing here watches for hot-plug.

#[cfg(feature = "native")]
pub mod native;
#[cfg(target_os = "linux")]
pub mod sysfs;

use async_trait::async_trait;
use stormwatch_core::{DeviceInfo, StormwatchError};

/// Host-level API returning the available devices
#[async_trait]
pub trait DeviceProvider: Send + Sync {
    /// Query the host once; fails with [`StormwatchError::DeviceEnumeration`]
    /// when access is denied or the backend is unavailable
    async fn enumerate(&self) -> Result<Vec<DeviceInfo>, StormwatchError>;

    /// Short backend name for logs
    fn backend_name(&self) -> &'static str;
}

/// Get the appropriate provider for this platform
pub fn platform_provider() -> Box<dyn DeviceProvider> {
    #[cfg(feature = "native")]
    {
        Box::new(native::NativeDeviceProvider::new())
    }
    #[cfg(all(not(feature = "native"), target_os = "linux"))]
    {
        Box::new(sysfs::SysfsDeviceProvider::new())
    }
    #[cfg(all(not(feature = "native"), not(target_os = "linux")))]
    {
        Box::new(UnavailableProvider)
    }
}

/// Provider returning a fixed device list
#[derive(Debug, Clone, Default)]
pub struct StaticDeviceProvider {
    devices: Vec<DeviceInfo>,
}

impl StaticDeviceProvider {
    /// Create a provider that always reports `devices`
    pub fn new(devices: Vec<DeviceInfo>) -> Self {
        Self { devices }
    }
}

#[async_trait]
impl DeviceProvider for StaticDeviceProvider {
    async fn enumerate(&self) -> Result<Vec<DeviceInfo>, StormwatchError> {
        Ok(self.devices.clone())
    }

    fn backend_name(&self) -> &'static str {
        "static"
    }
}

/// Provider for platforms without a capture backend
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableProvider;

#[async_trait]
impl DeviceProvider for UnavailableProvider {
    async fn enumerate(&self) -> Result<Vec<DeviceInfo>, StormwatchError> {
        Err(StormwatchError::DeviceEnumeration {
            reason: "no capture backend available on this platform".to_string(),
        })
    }

    fn backend_name(&self) -> &'static str {
        "unavailable"
    }
}
