//! Devices queued for unenrollment.

use crate::{Record, Resource};

/// Pending removal of a device, keyed by UDID.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RemoveRecord {
    pub udid: String,
    pub queued_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl Record for RemoveRecord {
    const RESOURCE: Resource = Resource::RemoveDevice;
}

impl RemoveRecord {
    pub fn new(udid: impl Into<String>) -> Self {
        Self {
            udid: udid.into(),
            queued_at: chrono::Utc::now(),
            reason: None,
        }
    }
}
