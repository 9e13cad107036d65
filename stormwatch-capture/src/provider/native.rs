//! Native camera enumeration through nokhwa (AVFoundation, MediaFoundation, V4L2)

use super::DeviceProvider;
use async_trait::async_trait;
use nokhwa::utils::ApiBackend;
use stormwatch_core::{DeviceInfo, DeviceKind, StormwatchError};
use tracing::debug;

/// Enumerates cameras with the platform's native capture API
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeDeviceProvider;

impl NativeDeviceProvider {
    /// Create a native provider
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DeviceProvider for NativeDeviceProvider {
    async fn enumerate(&self) -> Result<Vec<DeviceInfo>, StormwatchError> {
        // nokhwa queries block on the OS capture API
        let cameras = tokio::task::spawn_blocking(|| nokhwa::query(ApiBackend::Auto))
            .await
            .map_err(|e| StormwatchError::DeviceEnumeration {
                reason: format!("enumeration task failed: {}", e),
            })?
            .map_err(|e| StormwatchError::DeviceEnumeration {
                reason: e.to_string(),
            })?;

        debug!(count = cameras.len(), "Enumerated native cameras");
        Ok(cameras
            .into_iter()
            .map(|camera| DeviceInfo {
                id: camera.index().as_string(),
                kind: DeviceKind::VideoInput,
                label: camera.human_name(),
            })
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "native"
    }
}
