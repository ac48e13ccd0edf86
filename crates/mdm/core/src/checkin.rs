//! MDM check-in message types.

use crate::Enrollment;

/// Check-in messages that drive device lifecycle state.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "MessageType")]
pub enum CheckinMessage {
    /// Initial device authentication.
    Authenticate(Authenticate),
    /// Push token update (enrollment complete).
    TokenUpdate(TokenUpdate),
    /// Device unenrollment.
    CheckOut(CheckOut),
    /// Any other message type; not handled by this backend.
    #[serde(other)]
    Unsupported,
}

impl CheckinMessage {
    pub fn enrollment(&self) -> Option<&Enrollment> {
        match self {
            Self::Authenticate(m) => Some(&m.enrollment),
            Self::TokenUpdate(m) => Some(&m.enrollment),
            Self::CheckOut(m) => Some(&m.enrollment),
            Self::Unsupported => None,
        }
    }
}

/// Authenticate message - initial device identity.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Authenticate {
    #[serde(flatten)]
    pub enrollment: Enrollment,

    /// Device topic for push notifications.
    pub topic: String,

    #[serde(default)]
    pub build_version: Option<String>,

    #[serde(default, rename = "OSVersion")]
    pub os_version: Option<String>,

    #[serde(default)]
    pub product_name: Option<String>,

    #[serde(default)]
    pub serial_number: Option<String>,

    #[serde(default)]
    pub device_name: Option<String>,

    #[serde(default)]
    pub model: Option<String>,
}

/// TokenUpdate message - push token registration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TokenUpdate {
    #[serde(flatten)]
    pub enrollment: Enrollment,

    pub topic: String,

    /// Push token.
    pub token: plist::Data,

    pub push_magic: String,

    #[serde(default)]
    pub unlock_token: Option<plist::Data>,

    /// Awaiting configuration (DEP).
    #[serde(default)]
    pub awaiting_configuration: bool,
}

/// CheckOut message - device unenrollment.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CheckOut {
    #[serde(flatten)]
    pub enrollment: Enrollment,

    pub topic: String,
}

/// Parse a check-in message from plist bytes.
pub fn parse_checkin(data: &[u8]) -> color_eyre::eyre::Result<CheckinMessage> {
    use color_eyre::eyre::WrapErr as _;

    plist::from_bytes(data).wrap_err("failed to parse check-in message")
}
