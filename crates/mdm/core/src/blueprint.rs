//! Blueprints: named bundles of profiles applied at lifecycle events.

use crate::{Error, Record, Resource, Result};

/// Trigger name for blueprints applied when a device first enrolls.
pub const APPLY_AT_ENROLL: &str = "Enroll";

/// A named bundle of profile references plus the events that apply it.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Blueprint {
    pub uuid: String,
    /// Unique across all blueprints.
    pub name: String,
    /// Ordered profile identifiers; each must exist in the profile catalog.
    #[serde(default)]
    pub profile_ids: Vec<String>,
    #[serde(default)]
    pub user_uuids: Vec<String>,
    /// Trigger event names, matched case-insensitively.
    #[serde(default)]
    pub apply_at: Vec<String>,
}

impl Record for Blueprint {
    const RESOURCE: Resource = Resource::Blueprint;
}

impl Blueprint {
    /// Structural validation.
    pub fn verify(&self) -> Result<()> {
        if self.uuid.is_empty() {
            return Err(Error::validation("uuid", "blueprint must have a UUID"));
        }
        if self.name.is_empty() {
            return Err(Error::validation("name", "blueprint must have a Name"));
        }
        Ok(())
    }

    /// Whether `trigger` is in this blueprint's trigger set.
    pub fn applies_at(&self, trigger: &str) -> bool {
        let key = trigger_key(trigger);
        self.apply_at.iter().any(|t| trigger_key(t) == key)
    }

    /// Normalized, de-duplicated trigger keys.
    pub fn trigger_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.apply_at.iter().map(|t| trigger_key(t)).collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

/// Case-folded form of a trigger name, used as the trigger index key.
pub fn trigger_key(trigger: &str) -> String {
    trigger.to_lowercase()
}
