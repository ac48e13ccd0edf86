//! Enrolled device identity.

use crate::{Error, Record, Resource, Result};

/// Device identity record.
///
/// Stored under its UUID; UDID and serial number resolve to the UUID through
/// the device index.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Device {
    /// Primary identifier, immutable once assigned.
    pub uuid: String,
    /// Hardware UDID.
    #[serde(default)]
    pub udid: String,
    #[serde(default)]
    pub serial_number: String,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub device_name: String,
    #[serde(default)]
    pub os_version: String,
    #[serde(default)]
    pub build_version: String,
    /// Whether the device currently has an active enrollment.
    #[serde(default)]
    pub enrolled: bool,
    #[serde(default)]
    pub last_seen: Option<chrono::DateTime<chrono::Utc>>,
}

impl Record for Device {
    const RESOURCE: Resource = Resource::Device;
}

impl Device {
    /// Create a device with a fresh UUID.
    pub fn new(udid: impl Into<String>) -> Self {
        Self {
            uuid: uuid::Uuid::new_v4().to_string(),
            udid: udid.into(),
            ..Default::default()
        }
    }

    pub fn verify(&self) -> Result<()> {
        if self.uuid.is_empty() {
            return Err(Error::validation("uuid", "device must have a UUID"));
        }
        Ok(())
    }
}

/// Filter for device listing.
#[derive(Debug, Clone, Default)]
pub struct ListDevicesOption {
    /// Only return devices with one of these serial numbers. Empty means all.
    pub filter_serials: Vec<String>,
}

impl ListDevicesOption {
    pub fn matches(&self, dev: &Device) -> bool {
        self.filter_serials.is_empty() || self.filter_serials.iter().any(|s| *s == dev.serial_number)
    }
}
