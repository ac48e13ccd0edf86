//! Enrollment feed client boundary.

use mdm_core::Cursor;

/// Change recorded by the feed for a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpType {
    Added,
    Modified,
    Deleted,
}

/// A device as reported by the enrollment feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepDevice {
    pub serial_number: String,
    pub model: String,
    pub description: String,
    /// `None` on a full fetch, set on incremental syncs.
    pub op_type: Option<OpType>,
    pub op_date: Option<chrono::DateTime<chrono::Utc>>,
}

impl DepDevice {
    /// Devices from a full fetch and devices added since the cursor.
    pub fn is_newly_seen(&self) -> bool {
        matches!(self.op_type, None | Some(OpType::Added))
    }
}

/// One page of the feed.
#[derive(Debug, Clone, Default)]
pub struct DevicePage {
    pub devices: Vec<DepDevice>,
    /// Cursor to resume after this page.
    pub cursor: String,
    pub more_to_follow: bool,
}

/// Client for the enrollment program's device feed.
#[trait_variant::make(Send)]
pub trait DepClient: Send + Sync {
    /// Fetch the page after `cursor`, or the first page of a full sync.
    async fn fetch_devices(&self, cursor: Option<&Cursor>) -> color_eyre::eyre::Result<DevicePage>;

    /// Assign an enrollment profile to devices by serial number.
    async fn assign_profile(
        &self,
        profile_uuid: &str,
        serials: &[String],
    ) -> color_eyre::eyre::Result<()>;
}
