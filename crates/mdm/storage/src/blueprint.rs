//! Blueprints with name and trigger indices.

use std::collections::BTreeSet;

use mdm_core::{Blueprint, Error, Record, Resource, Result, trigger_key};

use crate::storage::{ReadTxExt as _, WriteTxExt as _};
use crate::{BlueprintStore, Bucket, KeyedStore, ReadTx, Storage, WriteTx};

/// Blueprint UUIDs registered under one trigger key.
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct TriggerEntry {
    blueprints: BTreeSet<String>,
}

impl Record for TriggerEntry {
    const RESOURCE: Resource = Resource::Blueprint;
}

fn link_trigger(tx: &mut dyn WriteTx, trigger: &str, uuid: &str) -> Result<()> {
    let mut entry: TriggerEntry = tx
        .record(Bucket::BlueprintTriggerIndex, trigger)?
        .unwrap_or_default();
    if entry.blueprints.insert(uuid.to_string()) {
        tx.put_record(Bucket::BlueprintTriggerIndex, trigger, &entry)?;
    }
    Ok(())
}

fn unlink_trigger(tx: &mut dyn WriteTx, trigger: &str, uuid: &str) -> Result<()> {
    let Some(mut entry) = tx.record::<TriggerEntry>(Bucket::BlueprintTriggerIndex, trigger)?
    else {
        return Ok(());
    };
    entry.blueprints.remove(uuid);
    if entry.blueprints.is_empty() {
        tx.delete(Bucket::BlueprintTriggerIndex, trigger)?;
    } else {
        tx.put_record(Bucket::BlueprintTriggerIndex, trigger, &entry)?;
    }
    Ok(())
}

fn by_uuid<R: ReadTx + ?Sized>(tx: &R, uuid: &str, via: &str) -> Result<Blueprint> {
    tx.record(Bucket::Blueprints, uuid)?.ok_or_else(|| {
        Error::not_found(Resource::Blueprint, format!("uuid {uuid} (indexed by {via})"))
    })
}

fn by_name<R: ReadTx + ?Sized>(tx: &R, name: &str) -> Result<Blueprint> {
    let uuid = tx
        .index(Bucket::BlueprintNameIndex, name, Resource::Blueprint)?
        .ok_or_else(|| Error::not_found(Resource::Blueprint, format!("name {name}")))?;
    by_uuid(tx, &uuid, &format!("name {name}"))
}

impl<S: KeyedStore> Storage<S> {
    fn check_users(&self, bp: &Blueprint) -> Result<()> {
        let Some(users) = self.users() else {
            return Ok(());
        };
        for user in &bp.user_uuids {
            if !users.user_exists(user)? {
                return Err(Error::validation(
                    "user_uuids",
                    format!("user {user} in blueprint {} does not exist", bp.name),
                ));
            }
        }
        Ok(())
    }
}

impl<S: KeyedStore> BlueprintStore for Storage<S> {
    fn save_blueprint(&self, bp: &Blueprint) -> Result<()> {
        bp.verify()?;
        self.check_users(bp)?;
        let triggers = bp.trigger_keys();

        self.update("save blueprint", |tx| {
            if let Some(owner) = tx.index(Bucket::BlueprintNameIndex, &bp.name, Resource::Blueprint)? {
                if owner != bp.uuid {
                    return Err(Error::conflict(format!(
                        "blueprint name {:?} already used by {owner}",
                        bp.name
                    )));
                }
            }

            for id in &bp.profile_ids {
                if tx.get(Bucket::Profiles, id)?.is_none() {
                    return Err(Error::validation(
                        "profile_ids",
                        format!("profile {id} in blueprint {} does not exist", bp.name),
                    ));
                }
            }

            if let Some(previous) = tx.record::<Blueprint>(Bucket::Blueprints, &bp.uuid)? {
                if previous.name != bp.name {
                    tx.delete(Bucket::BlueprintNameIndex, &previous.name)?;
                }
                for stale in previous.trigger_keys() {
                    if !triggers.contains(&stale) {
                        unlink_trigger(tx, &stale, &bp.uuid)?;
                    }
                }
            }

            tx.put_record(Bucket::Blueprints, &bp.uuid, bp)?;
            tx.put(Bucket::BlueprintNameIndex, &bp.name, bp.uuid.as_bytes())?;
            for trigger in &triggers {
                link_trigger(tx, trigger, &bp.uuid)?;
            }
            Ok(())
        })?;

        tracing::info!(uuid = %bp.uuid, name = %bp.name, profiles = bp.profile_ids.len(), "saved blueprint");
        Ok(())
    }

    fn list_blueprints(&self) -> Result<Vec<Blueprint>> {
        self.records(Bucket::Blueprints)
    }

    fn blueprint_by_name(&self, name: &str) -> Result<Blueprint> {
        self.view(|tx| by_name(tx, name))
    }

    fn blueprints_by_trigger(&self, trigger: &str) -> Result<Vec<Blueprint>> {
        let key = trigger_key(trigger);
        self.view(|tx| {
            let entry: TriggerEntry = tx
                .record(Bucket::BlueprintTriggerIndex, &key)?
                .unwrap_or_default();
            let mut found = Vec::with_capacity(entry.blueprints.len());
            for uuid in &entry.blueprints {
                // deleted between reading the index and the record
                match tx.record::<Blueprint>(Bucket::Blueprints, uuid)? {
                    Some(bp) => found.push(bp),
                    None => tracing::debug!(uuid = %uuid, trigger = %key, "skipping blueprint deleted mid-lookup"),
                }
            }
            Ok(found)
        })
    }

    fn delete_blueprint(&self, name: &str) -> Result<()> {
        let bp = self.update("delete blueprint", |tx| {
            let bp = by_name(&*tx, name)?;
            // indices go first so no reader finds an entry without its record
            for trigger in bp.trigger_keys() {
                unlink_trigger(tx, &trigger, &bp.uuid)?;
            }
            tx.delete(Bucket::BlueprintNameIndex, &bp.name)?;
            tx.delete(Bucket::Blueprints, &bp.uuid)?;
            Ok(bp)
        })?;

        tracing::info!(uuid = %bp.uuid, name = %bp.name, "deleted blueprint");
        Ok(())
    }
}
