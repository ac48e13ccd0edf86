//! Push routing and the removal queue.

use mdm_core::{Error, PushInfo, RemoveRecord, Resource, Result};

use crate::storage::WriteTxExt as _;
use crate::{Bucket, KeyedStore, PushStore, RemoveStore, Storage};

impl<S: KeyedStore> PushStore for Storage<S> {
    fn save_push_info(&self, info: &PushInfo) -> Result<()> {
        if info.udid.is_empty() {
            return Err(Error::validation("udid", "push info needs a UDID"));
        }
        self.update("save push info", |tx| {
            tx.put_record(Bucket::PushInfo, &info.udid, info)
        })?;
        tracing::debug!(udid = %info.udid, topic = %info.topic, "saved push info");
        Ok(())
    }

    fn push_info(&self, udid: &str) -> Result<PushInfo> {
        self.record(Bucket::PushInfo, udid)?
            .ok_or_else(|| Error::not_found(Resource::PushInfo, udid))
    }
}

impl<S: KeyedStore> RemoveStore for Storage<S> {
    fn save_remove_record(&self, record: &RemoveRecord) -> Result<()> {
        if record.udid.is_empty() {
            return Err(Error::validation("udid", "remove record needs a UDID"));
        }
        self.update("queue device removal", |tx| {
            tx.put_record(Bucket::RemoveDevice, &record.udid, record)
        })?;
        tracing::info!(udid = %record.udid, "queued device removal");
        Ok(())
    }

    fn remove_record(&self, udid: &str) -> Result<RemoveRecord> {
        self.record(Bucket::RemoveDevice, udid)?
            .ok_or_else(|| Error::not_found(Resource::RemoveDevice, udid))
    }

    fn delete_remove_record(&self, udid: &str) -> Result<()> {
        let existed = self.update("complete device removal", |tx| {
            tx.delete(Bucket::RemoveDevice, udid)
        })?;
        if !existed {
            return Err(Error::not_found(Resource::RemoveDevice, udid));
        }
        Ok(())
    }
}
