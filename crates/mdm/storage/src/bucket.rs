//! Named collections.

/// A named collection of records or index entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    /// Device records keyed by UUID.
    Devices,
    /// `udid:<UDID>` and `serial:<serial>` to device UUID.
    DeviceIndex,
    /// UDID to identity certificate hash.
    UdidCertAuth,
    Profiles,
    /// Blueprint records keyed by UUID.
    Blueprints,
    /// Blueprint name to UUID.
    BlueprintNameIndex,
    /// Case-folded trigger name to the set of blueprint UUIDs.
    BlueprintTriggerIndex,
    PushInfo,
    /// Singleton sync cursor.
    DepConfig,
    DepAutoAssign,
    /// Enrollment tokens and the enrollment keypair.
    DepToken,
    RemoveDevice,
}

impl Bucket {
    pub const ALL: [Bucket; 12] = [
        Bucket::Devices,
        Bucket::DeviceIndex,
        Bucket::UdidCertAuth,
        Bucket::Profiles,
        Bucket::Blueprints,
        Bucket::BlueprintNameIndex,
        Bucket::BlueprintTriggerIndex,
        Bucket::PushInfo,
        Bucket::DepConfig,
        Bucket::DepAutoAssign,
        Bucket::DepToken,
        Bucket::RemoveDevice,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Devices => "mdm.Devices",
            Self::DeviceIndex => "mdm.DeviceIdx",
            Self::UdidCertAuth => "mdm.UDIDCertAuth",
            Self::Profiles => "mdm.Profile",
            Self::Blueprints => "mdm.Blueprint",
            Self::BlueprintNameIndex => "mdm.BlueprintIdx",
            Self::BlueprintTriggerIndex => "mdm.BlueprintApplyAtIdx",
            Self::PushInfo => "mdm.PushInfo",
            Self::DepConfig => "mdm.DEPConfig",
            Self::DepAutoAssign => "mdm.DEPAutoAssign",
            Self::DepToken => "mdm.DEPToken",
            Self::RemoveDevice => "mdm.RemoveDevice",
        }
    }
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
