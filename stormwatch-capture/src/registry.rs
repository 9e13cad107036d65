//! Device registry: the enumerated list of selectable cameras

use crate::provider::DeviceProvider;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use stormwatch_core::{
    CaptureDevice, DeviceInfo, DeviceKind, EventReporter, SessionEvent, SessionStore,
    StormwatchError,
};
use tracing::{info, warn};

/// Enumerates capture devices on request and publishes them into the session state
///
/// The registry never polls the provider by itself. [`DeviceRegistry::list_devices`]
/// runs once at startup; [`DeviceRegistry::refresh`] is there for callers that
/// want to pick up devices attached later.
pub struct DeviceRegistry {
    provider: Arc<dyn DeviceProvider>,
    store: SessionStore,
    events: EventReporter,
    devices: RwLock<Vec<CaptureDevice>>,
}

impl DeviceRegistry {
    /// Create a registry that publishes into `store`
    pub fn new(provider: Arc<dyn DeviceProvider>, store: SessionStore, events: EventReporter) -> Self {
        Self {
            provider,
            store,
            events,
            devices: RwLock::new(Vec::new()),
        }
    }

    /// Query the provider once and keep the video inputs it reports.
    ///
    /// On failure the registry holds an empty list and the error is returned
    /// and reported; there is no automatic retry.
    pub async fn list_devices(&self) -> Result<Vec<CaptureDevice>, StormwatchError> {
        match self.provider.enumerate().await {
            Ok(reported) => {
                let devices = video_inputs(reported);
                info!(
                    backend = self.provider.backend_name(),
                    count = devices.len(),
                    "Capture devices enumerated"
                );
                self.publish(devices.clone());
                self.events.report(SessionEvent::DevicesEnumerated {
                    count: devices.len(),
                });
                Ok(devices)
            }
            Err(error) => {
                warn!(
                    backend = self.provider.backend_name(),
                    "Device enumeration failed: {}", error
                );
                self.publish(Vec::new());
                self.events.report(SessionEvent::DeviceEnumerationFailed {
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }

    /// Re-query the provider; same contract as [`DeviceRegistry::list_devices`]
    pub async fn refresh(&self) -> Result<Vec<CaptureDevice>, StormwatchError> {
        self.list_devices().await
    }

    /// Devices from the last enumeration
    pub fn devices(&self) -> Vec<CaptureDevice> {
        self.devices.read().clone()
    }

    /// First device of the last enumeration
    pub fn default_device(&self) -> Option<CaptureDevice> {
        self.devices.read().first().cloned()
    }

    /// Look up a device by id
    pub fn find(&self, device_id: &str) -> Option<CaptureDevice> {
        self.devices
            .read()
            .iter()
            .find(|device| device.id == device_id)
            .cloned()
    }

    fn publish(&self, devices: Vec<CaptureDevice>) {
        *self.devices.write() = devices.clone();
        self.store.update(|state| {
            if state.devices == devices {
                return false;
            }
            state.devices = devices;
            true
        });
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("backend", &self.provider.backend_name())
            .field("devices", &self.devices.read().len())
            .finish()
    }
}

/// Keep video inputs with a usable id, first occurrence of each id wins
fn video_inputs(reported: Vec<DeviceInfo>) -> Vec<CaptureDevice> {
    let mut seen = HashSet::new();
    reported
        .into_iter()
        .filter(|info| info.kind == DeviceKind::VideoInput && !info.id.is_empty())
        .filter(|info| seen.insert(info.id.clone()))
        .map(CaptureDevice::from)
        .collect()
}
