//! Entity store traits.

use mdm_core::{
    AutoAssigner, Blueprint, Cursor, DepKeypair, DepToken, Device, ListDevicesOption, Profile,
    PushInfo, RemoveRecord, Result,
};

/// Device identity records with UDID and serial-number lookups.
pub trait DeviceStore: Send + Sync {
    /// Upsert a device and its index entries.
    fn save_device(&self, dev: &Device) -> Result<()>;

    fn list_devices(&self, opt: &ListDevicesOption) -> Result<Vec<Device>>;

    fn device_by_udid(&self, udid: &str) -> Result<Device>;

    fn device_by_serial(&self, serial: &str) -> Result<Device>;

    /// Remove the device and every index entry that points at it.
    fn delete_device_by_udid(&self, udid: &str) -> Result<()>;

    fn delete_device_by_serial(&self, serial: &str) -> Result<()>;
}

/// Binding of a device UDID to its identity certificate.
pub trait CertAuthStore: Send + Sync {
    fn save_udid_cert_hash(&self, udid: &str, hash: &[u8]) -> Result<()>;

    fn udid_cert_hash(&self, udid: &str) -> Result<Vec<u8>>;
}

/// Validated configuration profiles.
pub trait ProfileStore: Send + Sync {
    fn save_profile(&self, profile: &Profile) -> Result<()>;

    fn profile_by_id(&self, identifier: &str) -> Result<Profile>;

    fn list_profiles(&self) -> Result<Vec<Profile>>;

    /// Does not check blueprint references.
    fn delete_profile(&self, identifier: &str) -> Result<()>;
}

/// Blueprints with a unique name index and a trigger index.
pub trait BlueprintStore: Send + Sync {
    fn save_blueprint(&self, bp: &Blueprint) -> Result<()>;

    fn list_blueprints(&self) -> Result<Vec<Blueprint>>;

    fn blueprint_by_name(&self, name: &str) -> Result<Blueprint>;

    /// Every blueprint whose trigger set contains `trigger`, case-insensitively.
    fn blueprints_by_trigger(&self, trigger: &str) -> Result<Vec<Blueprint>>;

    fn delete_blueprint(&self, name: &str) -> Result<()>;
}

/// Per-device push routing.
pub trait PushStore: Send + Sync {
    fn save_push_info(&self, info: &PushInfo) -> Result<()>;

    fn push_info(&self, udid: &str) -> Result<PushInfo>;
}

/// Devices queued for unenrollment.
pub trait RemoveStore: Send + Sync {
    fn save_remove_record(&self, record: &RemoveRecord) -> Result<()>;

    fn remove_record(&self, udid: &str) -> Result<RemoveRecord>;

    fn delete_remove_record(&self, udid: &str) -> Result<()>;
}

/// Enrollment-program state: cursor, auto-assigners, tokens, keypair.
pub trait DepStore: Send + Sync {
    /// `None` when no sync has completed yet.
    fn load_cursor(&self) -> Result<Option<Cursor>>;

    fn save_cursor(&self, cursor: &Cursor) -> Result<()>;

    /// Rejects any filter other than the wildcard.
    fn save_auto_assigner(&self, assigner: &AutoAssigner) -> Result<()>;

    /// No-op for an unknown filter.
    fn delete_auto_assigner(&self, filter: &str) -> Result<()>;

    fn load_auto_assigners(&self) -> Result<Vec<AutoAssigner>>;

    fn save_dep_token(&self, token: &DepToken) -> Result<()>;

    fn dep_tokens(&self) -> Result<Vec<DepToken>>;

    fn dep_keypair(&self) -> Result<Option<DepKeypair>>;

    /// Persist `candidate` unless a keypair is already stored, and return
    /// whichever keypair is stored afterwards.
    fn store_dep_keypair_if_absent(&self, candidate: &DepKeypair) -> Result<DepKeypair>;
}

/// Read-only user directory consulted when saving blueprints.
pub trait UserCatalog: Send + Sync {
    fn user_exists(&self, uuid: &str) -> Result<bool>;
}

/// Combined storage trait.
pub trait AllStorage:
    DeviceStore
    + CertAuthStore
    + ProfileStore
    + BlueprintStore
    + PushStore
    + RemoveStore
    + DepStore
    + Clone
    + 'static
{
}

impl<T> AllStorage for T where
    T: DeviceStore
        + CertAuthStore
        + ProfileStore
        + BlueprintStore
        + PushStore
        + RemoveStore
        + DepStore
        + Clone
        + 'static
{
}
