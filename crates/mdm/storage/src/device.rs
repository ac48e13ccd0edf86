//! Device records and their UDID/serial index.

use mdm_core::{Device, Error, ListDevicesOption, Resource, Result};

use crate::storage::{ReadTxExt as _, WriteTxExt as _};
use crate::{Bucket, CertAuthStore, DeviceStore, KeyedStore, ReadTx, Storage};

fn udid_key(udid: &str) -> String {
    format!("udid:{udid}")
}

fn serial_key(serial: &str) -> String {
    format!("serial:{serial}")
}

/// Index keys for every non-empty identifier the device carries.
fn index_keys(dev: &Device) -> Vec<String> {
    let mut keys = Vec::with_capacity(2);
    if !dev.udid.is_empty() {
        keys.push(udid_key(&dev.udid));
    }
    if !dev.serial_number.is_empty() {
        keys.push(serial_key(&dev.serial_number));
    }
    keys
}

/// Index key to live primary record; a dangling entry is reported as NotFound.
fn resolve<R: ReadTx + ?Sized>(tx: &R, key: &str) -> Result<Device> {
    let uuid = tx
        .index(Bucket::DeviceIndex, key, Resource::Device)?
        .ok_or_else(|| Error::not_found(Resource::Device, key))?;
    tx.record(Bucket::Devices, &uuid)?.ok_or_else(|| {
        Error::not_found(Resource::Device, format!("uuid {uuid} (indexed by {key})"))
    })
}

impl<S: KeyedStore> Storage<S> {
    fn delete_device_by_key(&self, key: String) -> Result<()> {
        let dev = self.update("delete device", |tx| {
            let dev = resolve(&*tx, &key)?;
            for index in index_keys(&dev) {
                tx.delete(Bucket::DeviceIndex, &index)?;
            }
            tx.delete(Bucket::Devices, &dev.uuid)?;
            Ok(dev)
        })?;

        tracing::info!(uuid = %dev.uuid, udid = %dev.udid, serial = %dev.serial_number, "deleted device");
        Ok(())
    }
}

impl<S: KeyedStore> DeviceStore for Storage<S> {
    fn save_device(&self, dev: &Device) -> Result<()> {
        dev.verify()?;
        let keys = index_keys(dev);

        self.update("save device", |tx| {
            for key in &keys {
                if let Some(owner) = tx.index(Bucket::DeviceIndex, key, Resource::Device)? {
                    if owner != dev.uuid {
                        return Err(Error::conflict(format!(
                            "{key} already belongs to device {owner}"
                        )));
                    }
                }
            }

            if let Some(previous) = tx.record::<Device>(Bucket::Devices, &dev.uuid)? {
                for stale in index_keys(&previous) {
                    if !keys.contains(&stale) {
                        tx.delete(Bucket::DeviceIndex, &stale)?;
                    }
                }
            }

            tx.put_record(Bucket::Devices, &dev.uuid, dev)?;
            for key in &keys {
                tx.put(Bucket::DeviceIndex, key, dev.uuid.as_bytes())?;
            }
            Ok(())
        })?;

        tracing::debug!(uuid = %dev.uuid, udid = %dev.udid, "saved device");
        Ok(())
    }

    fn list_devices(&self, opt: &ListDevicesOption) -> Result<Vec<Device>> {
        let devices: Vec<Device> = self.records(Bucket::Devices)?;
        Ok(devices.into_iter().filter(|d| opt.matches(d)).collect())
    }

    fn device_by_udid(&self, udid: &str) -> Result<Device> {
        self.view(|tx| resolve(tx, &udid_key(udid)))
    }

    fn device_by_serial(&self, serial: &str) -> Result<Device> {
        self.view(|tx| resolve(tx, &serial_key(serial)))
    }

    fn delete_device_by_udid(&self, udid: &str) -> Result<()> {
        self.delete_device_by_key(udid_key(udid))
    }

    fn delete_device_by_serial(&self, serial: &str) -> Result<()> {
        self.delete_device_by_key(serial_key(serial))
    }
}

impl<S: KeyedStore> CertAuthStore for Storage<S> {
    fn save_udid_cert_hash(&self, udid: &str, hash: &[u8]) -> Result<()> {
        if udid.is_empty() {
            return Err(Error::validation("udid", "cert hash needs a UDID"));
        }
        self.update("save udid cert hash", |tx| {
            tx.put(Bucket::UdidCertAuth, udid, hash)
        })
    }

    fn udid_cert_hash(&self, udid: &str) -> Result<Vec<u8>> {
        self.view(|tx| tx.get(Bucket::UdidCertAuth, udid))?
            .ok_or_else(|| Error::not_found(Resource::CertAuth, udid))
    }
}
