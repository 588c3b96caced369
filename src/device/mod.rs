//! Device Module
//!
//! Resolves device tokens to human readable descriptions. A token that no
//! longer resolves belongs to a device that was removed from enrollment.

use crate::config::DeviceConfig;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::info;

/// Lookup of enrolled devices
#[async_trait]
pub trait DeviceApi: Send + Sync {
    /// Description of the device, or `None` when it is not enrolled
    async fn device_description(&self, device_token: &str) -> anyhow::Result<Option<String>>;
}

/// In-memory directory of enrolled devices
#[derive(Debug, Default)]
pub struct DeviceDirectory {
    devices: RwLock<HashMap<String, String>>,
}

impl DeviceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a directory from the configured devices
    pub fn from_config(devices: &[DeviceConfig]) -> Self {
        let directory = Self::new();
        for device in devices {
            directory.enroll(&device.token, &device.description);
        }
        directory
    }

    /// Enroll a device, replacing any earlier description
    pub fn enroll(&self, device_token: &str, description: &str) {
        self.devices
            .write()
            .insert(device_token.to_string(), description.to_string());
    }

    /// Remove a device from enrollment
    pub fn remove(&self, device_token: &str) -> bool {
        let removed = self.devices.write().remove(device_token).is_some();
        if removed {
            info!("Device {} removed from enrollment", device_token);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }
}

#[async_trait]
impl DeviceApi for DeviceDirectory {
    async fn device_description(&self, device_token: &str) -> anyhow::Result<Option<String>> {
        Ok(self.devices.read().get(device_token).cloned())
    }
}
