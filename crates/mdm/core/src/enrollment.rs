//! Enrollment identification from check-in messages.

/// Type of MDM enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum EnrollType {
    /// Standard device enrollment (UDID-based).
    Device,
    /// User channel on a device.
    User,
    /// User Enrollment device.
    UserEnrollmentDevice,
    /// User channel on UserEnrollmentDevice.
    UserEnrollment,
}

/// Raw enrollment data from check-in messages.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Enrollment {
    /// Device UDID (legacy enrollments).
    #[serde(default, rename = "UDID")]
    pub udid: Option<String>,

    /// User ID for user-channel enrollments.
    #[serde(default, rename = "UserID")]
    pub user_id: Option<String>,

    /// Enrollment ID for User Enrollment devices.
    #[serde(default, rename = "EnrollmentID")]
    pub enrollment_id: Option<String>,

    /// Enrollment User ID for User Enrollment.
    #[serde(default, rename = "EnrollmentUserID")]
    pub enrollment_user_id: Option<String>,
}

/// Resolved enrollment identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct EnrollId {
    pub enroll_type: EnrollType,
    /// Primary identifier.
    pub id: String,
    /// Parent device ID (for user channels).
    pub parent_id: Option<String>,
}

impl EnrollType {
    /// The user-channel counterpart of a device-channel type.
    fn user_channel(self) -> Self {
        match self {
            Self::Device => Self::User,
            Self::UserEnrollmentDevice => Self::UserEnrollment,
            other => other,
        }
    }
}

impl EnrollId {
    /// Device-channel identifier usable as a device UDID; `None` for user channels.
    pub fn device_udid(&self) -> Option<&str> {
        match self.enroll_type {
            EnrollType::Device | EnrollType::UserEnrollmentDevice => Some(&self.id),
            EnrollType::User | EnrollType::UserEnrollment => None,
        }
    }
}

impl Enrollment {
    /// Resolve this enrollment to an EnrollId.
    pub fn resolve(&self) -> Option<EnrollId> {
        let (enroll_type, device, user) = match (&self.enrollment_id, &self.udid) {
            (Some(id), _) => (
                EnrollType::UserEnrollmentDevice,
                id,
                self.enrollment_user_id.as_ref(),
            ),
            (None, Some(udid)) => (EnrollType::Device, udid, self.user_id.as_ref()),
            (None, None) => return None,
        };

        Some(match user {
            None => EnrollId {
                enroll_type,
                id: device.clone(),
                parent_id: None,
            },
            Some(user) => EnrollId {
                enroll_type: enroll_type.user_channel(),
                id: format!("{device}:{user}"),
                parent_id: Some(device.clone()),
            },
        })
    }
}
