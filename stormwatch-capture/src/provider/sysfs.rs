//! Video4Linux device enumeration through sysfs
//!
//! Every V4L2 node appears under `/sys/class/video4linux/videoN` with a `name`
//! attribute. A camera usually exposes several nodes; only the node with
//! `index == 0` carries the capture stream, the others are metadata nodes.

use super::DeviceProvider;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use stormwatch_core::{DeviceInfo, DeviceKind, StormwatchError};
use tracing::debug;

/// Default sysfs class directory
pub const VIDEO4LINUX_CLASS_DIR: &str = "/sys/class/video4linux";

/// V4L2 enumeration backed by sysfs
#[derive(Debug, Clone)]
pub struct SysfsDeviceProvider {
    class_dir: PathBuf,
}

impl SysfsDeviceProvider {
    /// Provider reading the system's video4linux class directory
    pub fn new() -> Self {
        Self::with_class_dir(VIDEO4LINUX_CLASS_DIR)
    }

    /// Provider reading an arbitrary class directory
    pub fn with_class_dir(class_dir: impl Into<PathBuf>) -> Self {
        Self {
            class_dir: class_dir.into(),
        }
    }

    async fn read_node(node_dir: &Path, node: &str) -> DeviceInfo {
        let label = read_attribute(&node_dir.join("name")).await.unwrap_or_default();
        let index = read_attribute(&node_dir.join("index"))
            .await
            .and_then(|raw| raw.parse::<u32>().ok())
            .unwrap_or(0);

        let kind = if index == 0 {
            DeviceKind::VideoInput
        } else {
            DeviceKind::Other("video-metadata".to_string())
        };

        DeviceInfo {
            id: format!("/dev/{}", node),
            kind,
            label,
        }
    }
}

impl Default for SysfsDeviceProvider {
    fn default() -> Self {
        Self::new()
    }
}

async fn read_attribute(path: &Path) -> Option<String> {
    tokio::fs::read_to_string(path)
        .await
        .ok()
        .map(|raw| raw.trim().to_string())
}

fn node_number(name: &str) -> Option<u32> {
    name.strip_prefix("video")?.parse().ok()
}

#[async_trait]
impl DeviceProvider for SysfsDeviceProvider {
    async fn enumerate(&self) -> Result<Vec<DeviceInfo>, StormwatchError> {
        let mut entries = tokio::fs::read_dir(&self.class_dir).await.map_err(|e| {
            let reason = match e.kind() {
                ErrorKind::PermissionDenied => format!("access to {} denied", self.class_dir.display()),
                ErrorKind::NotFound => format!("{} not present", self.class_dir.display()),
                _ => format!("cannot read {}: {}", self.class_dir.display(), e),
            };
            StormwatchError::DeviceEnumeration { reason }
        })?;

        let mut nodes = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    return Err(StormwatchError::DeviceEnumeration {
                        reason: format!("cannot list {}: {}", self.class_dir.display(), e),
                    })
                }
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(number) = node_number(&name) {
                nodes.push((number, name, entry.path()));
            }
        }
        nodes.sort_by_key(|(number, _, _)| *number);

        let mut devices = Vec::with_capacity(nodes.len());
        for (_, name, path) in nodes {
            devices.push(Self::read_node(&path, &name).await);
        }

        debug!(count = devices.len(), "Enumerated V4L2 nodes");
        Ok(devices)
    }

    fn backend_name(&self) -> &'static str {
        "v4l2-sysfs"
    }
}
