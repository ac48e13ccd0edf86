//! Profile catalog.

use mdm_core::{Error, Profile, Resource, Result};

use crate::storage::WriteTxExt as _;
use crate::{Bucket, KeyedStore, ProfileStore, Storage};

impl<S: KeyedStore> ProfileStore for Storage<S> {
    fn save_profile(&self, profile: &Profile) -> Result<()> {
        profile.validate()?;
        self.update("save profile", |tx| {
            tx.put_record(Bucket::Profiles, &profile.identifier, profile)
        })?;

        tracing::debug!(identifier = %profile.identifier, "saved profile");
        Ok(())
    }

    fn profile_by_id(&self, identifier: &str) -> Result<Profile> {
        self.record(Bucket::Profiles, identifier)?
            .ok_or_else(|| Error::not_found(Resource::Profile, identifier))
    }

    fn list_profiles(&self) -> Result<Vec<Profile>> {
        self.records(Bucket::Profiles)
    }

    fn delete_profile(&self, identifier: &str) -> Result<()> {
        let existed = self.update("delete profile", |tx| {
            tx.delete(Bucket::Profiles, identifier)
        })?;
        if !existed {
            return Err(Error::not_found(Resource::Profile, identifier));
        }

        tracing::info!(identifier, "deleted profile");
        Ok(())
    }
}
