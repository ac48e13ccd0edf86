//! Push-routing records.

use crate::{Record, Resource};

/// Information needed to wake a device through APNs, keyed by UDID.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PushInfo {
    pub udid: String,
    /// APNs push token (raw bytes).
    pub token: Vec<u8>,
    /// Push magic string.
    pub push_magic: String,
    /// APNs topic (from push certificate).
    pub topic: String,
}

impl Record for PushInfo {
    const RESOURCE: Resource = Resource::PushInfo;
}

impl PushInfo {
    /// Get push token as hex string.
    pub fn token_hex(&self) -> String {
        hex_encode(&self.token)
    }
}

/// Result of a push notification attempt.
#[derive(Debug, Clone)]
pub struct PushResult {
    /// Device that was pushed.
    pub udid: String,
    /// APNs response ID (if successful).
    pub apns_id: Option<String>,
    /// Error (if failed).
    pub error: Option<String>,
}

impl PushResult {
    pub fn success(udid: String, apns_id: String) -> Self {
        Self {
            udid,
            apns_id: Some(apns_id),
            error: None,
        }
    }

    pub fn failure(udid: String, error: impl std::fmt::Display) -> Self {
        Self {
            udid,
            apns_id: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
