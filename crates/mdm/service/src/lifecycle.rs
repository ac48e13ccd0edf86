//! Check-in handling: device identity, push routing and enroll-time blueprints.

use color_eyre::eyre::WrapErr as _;
use mdm_core::{
    APPLY_AT_ENROLL, Authenticate, Blueprint, CheckOut, Command, Device, EnrollId, Error,
    OptionalExt as _, PushInfo, RemoveRecord, Request, TokenUpdate, install_profile_command,
    serialize_command,
};
use mdm_crypto::cert_hash;
use mdm_events::{CommandCreated, DeviceRef, EventBus};
use mdm_storage::AllStorage;

use crate::Checkin;

/// Outcome of applying the blueprints registered under one trigger.
#[derive(Debug, Default)]
pub struct ApplyReport {
    /// UUIDs of the published commands, in publish order.
    pub commands: Vec<String>,
    /// Blueprints that were not applied, by name.
    pub skipped: Vec<(String, Error)>,
}

/// Device lifecycle service.
#[derive(Clone)]
pub struct Lifecycle<S> {
    store: S,
    bus: EventBus,
}

fn device_udid(id: &EnrollId) -> Option<&str> {
    let udid = id.device_udid();
    if udid.is_none() {
        tracing::debug!(enrollment_id = %id.id, "user channel check-in, no device state to record");
    }
    udid
}

impl<S: AllStorage> Lifecycle<S> {
    pub fn new(store: S, bus: EventBus) -> Self {
        Self { store, bus }
    }

    fn load_or_new(&self, udid: &str) -> mdm_core::Result<Device> {
        Ok(self
            .store
            .device_by_udid(udid)
            .optional()?
            .unwrap_or_else(|| Device::new(udid)))
    }

    /// Drop a record that still holds `dev`'s serial under another UUID.
    ///
    /// The serial is hardware identity, so a second record claiming it is
    /// left over from an earlier enrollment of the same device.
    fn release_serial(&self, dev: &Device) -> mdm_core::Result<()> {
        if dev.serial_number.is_empty() {
            return Ok(());
        }
        let Some(stale) = self.store.device_by_serial(&dev.serial_number).optional()? else {
            return Ok(());
        };
        if stale.uuid == dev.uuid {
            return Ok(());
        }

        tracing::warn!(
            serial = %dev.serial_number,
            stale_uuid = %stale.uuid,
            stale_udid = %stale.udid,
            udid = %dev.udid,
            "replacing stale device record"
        );
        self.store.delete_device_by_serial(&dev.serial_number)
    }

    /// Queue a device for removal; the next CheckOut completes it.
    pub fn queue_removal(&self, udid: &str, reason: Option<String>) -> mdm_core::Result<()> {
        let mut record = RemoveRecord::new(udid);
        record.reason = reason;
        self.store.save_remove_record(&record)?;
        tracing::info!(udid, "device queued for removal");
        Ok(())
    }

    /// Resolve every profile a blueprint references into an install command.
    ///
    /// A profile deleted after the blueprint was saved fails the whole
    /// blueprint with `ValidationFailed`.
    pub fn blueprint_commands(&self, bp: &Blueprint) -> mdm_core::Result<Vec<Command>> {
        bp.profile_ids
            .iter()
            .map(|id| match self.store.profile_by_id(id) {
                Ok(profile) => Ok(install_profile_command(&profile.payload)),
                Err(e) if e.is_not_found() => Err(Error::validation(
                    "profile_ids",
                    format!("profile {id} in blueprint {} does not exist", bp.name),
                )),
                Err(e) => Err(e),
            })
            .collect()
    }

    /// Publish install commands for every blueprint registered under `trigger`.
    pub fn apply_blueprints(
        &self,
        trigger: &str,
        udid: &str,
    ) -> color_eyre::eyre::Result<ApplyReport> {
        let blueprints = self
            .store
            .blueprints_by_trigger(trigger)
            .wrap_err_with(|| format!("failed to look up blueprints for trigger {trigger}"))?;

        let mut report = ApplyReport::default();
        for bp in blueprints {
            let commands = match self.blueprint_commands(&bp) {
                Ok(commands) => commands,
                Err(e) => {
                    tracing::warn!(udid, blueprint = %bp.name, error = %e, "blueprint not applied");
                    report.skipped.push((bp.name, e));
                    continue;
                }
            };

            for cmd in commands {
                let payload = serialize_command(&cmd)?;
                self.bus.publish(CommandCreated {
                    device: DeviceRef::Udid(udid.to_string()),
                    command_uuid: cmd.command_uuid.clone(),
                    request_type: cmd.command.request_type.clone(),
                    payload,
                });
                report.commands.push(cmd.command_uuid);
            }
            tracing::info!(udid, blueprint = %bp.name, trigger, "applied blueprint");
        }
        Ok(report)
    }
}

impl<S: AllStorage> Checkin for Lifecycle<S> {
    async fn authenticate(
        &self,
        req: &Request,
        msg: &Authenticate,
    ) -> color_eyre::eyre::Result<()> {
        let id = req.require_enroll_id()?;
        let Some(udid) = device_udid(id) else {
            return Ok(());
        };

        let mut dev = self.load_or_new(udid)?;
        let fields = [
            (&mut dev.serial_number, &msg.serial_number),
            (&mut dev.product_name, &msg.product_name),
            (&mut dev.model, &msg.model),
            (&mut dev.device_name, &msg.device_name),
            (&mut dev.os_version, &msg.os_version),
            (&mut dev.build_version, &msg.build_version),
        ];
        for (field, value) in fields {
            if let Some(value) = value {
                field.clone_from(value);
            }
        }
        dev.last_seen = Some(chrono::Utc::now());

        self.release_serial(&dev)?;
        self.store
            .save_device(&dev)
            .wrap_err("failed to store device")?;

        if let Some(cert) = &req.certificate {
            self.store
                .save_udid_cert_hash(udid, &cert_hash(cert))
                .wrap_err("failed to store certificate binding")?;
        }

        tracing::info!(
            enrollment_id = %id.id,
            uuid = %dev.uuid,
            serial = %dev.serial_number,
            "device authenticated"
        );
        Ok(())
    }

    async fn token_update(&self, req: &Request, msg: &TokenUpdate) -> color_eyre::eyre::Result<()> {
        let id = req.require_enroll_id()?;
        let Some(udid) = device_udid(id) else {
            return Ok(());
        };

        self.store
            .save_push_info(&PushInfo {
                udid: udid.to_string(),
                token: msg.token.clone().into(),
                push_magic: msg.push_magic.clone(),
                topic: msg.topic.clone(),
            })
            .wrap_err("failed to store push info")?;

        let mut dev = self.load_or_new(udid)?;
        let first_enrollment = !dev.enrolled;
        dev.enrolled = true;
        dev.last_seen = Some(chrono::Utc::now());
        self.store
            .save_device(&dev)
            .wrap_err("failed to store device")?;

        tracing::info!(enrollment_id = %id.id, first_enrollment, "token updated");

        if first_enrollment {
            let report = self.apply_blueprints(APPLY_AT_ENROLL, udid)?;
            tracing::debug!(
                udid,
                commands = report.commands.len(),
                skipped = report.skipped.len(),
                "enroll blueprints processed"
            );
        }
        Ok(())
    }

    async fn checkout(&self, req: &Request, _msg: &CheckOut) -> color_eyre::eyre::Result<()> {
        let id = req.require_enroll_id()?;
        let Some(udid) = device_udid(id) else {
            return Ok(());
        };

        if self.store.remove_record(udid).optional()?.is_some() {
            self.store
                .delete_remove_record(udid)
                .wrap_err("failed to complete removal")?;
            tracing::info!(udid, "queued removal completed");
        }

        if let Some(mut dev) = self.store.device_by_udid(udid).optional()? {
            dev.enrolled = false;
            dev.last_seen = Some(chrono::Utc::now());
            self.store
                .save_device(&dev)
                .wrap_err("failed to store device")?;
        }

        tracing::info!(enrollment_id = %id.id, "device checked out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mdm_core::{CheckinMessage, Profile, parse_checkin};
    use mdm_events::{Event, Topic};
    use mdm_storage::{
        BlueprintStore, CertAuthStore, DeviceStore, ProfileStore, PushStore, RedbStore,
        RemoveStore, Storage,
    };

    use super::*;
    use crate::dispatch_checkin;

    type Db = Storage<RedbStore>;

    fn service() -> (tempfile::TempDir, Db, EventBus, Lifecycle<Db>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Storage::new(RedbStore::open(&dir.path().join("mdm.redb")).unwrap());
        let bus = EventBus::default();
        let svc = Lifecycle::new(store.clone(), bus.clone());
        (dir, store, bus, svc)
    }

    fn message(body: &str) -> CheckinMessage {
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<plist version="1.0">
<dict>
{body}
</dict>
</plist>"#
        );
        parse_checkin(xml.as_bytes()).unwrap()
    }

    fn authenticate(udid: &str) -> CheckinMessage {
        message(&format!(
            "<key>MessageType</key><string>Authenticate</string>
             <key>UDID</key><string>{udid}</string>
             <key>Topic</key><string>com.apple.mgmt.test</string>
             <key>SerialNumber</key><string>C02TEST</string>
             <key>ProductName</key><string>Mac14,2</string>
             <key>OSVersion</key><string>14.5</string>"
        ))
    }

    fn token_update(udid: &str) -> CheckinMessage {
        message(&format!(
            "<key>MessageType</key><string>TokenUpdate</string>
             <key>UDID</key><string>{udid}</string>
             <key>Topic</key><string>com.apple.mgmt.test</string>
             <key>Token</key><data>3q2+7w==</data>
             <key>PushMagic</key><string>magic</string>"
        ))
    }

    fn checkout(udid: &str) -> CheckinMessage {
        message(&format!(
            "<key>MessageType</key><string>CheckOut</string>
             <key>UDID</key><string>{udid}</string>
             <key>Topic</key><string>com.apple.mgmt.test</string>"
        ))
    }

    fn profile(id: &str) -> Profile {
        let payload = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<plist version=\"1.0\"><dict><key>PayloadIdentifier</key><string>{id}</string></dict></plist>"
        );
        Profile {
            identifier: id.into(),
            payload: payload.into_bytes(),
        }
    }

    fn enroll_blueprint(uuid: &str, name: &str, profiles: &[&str]) -> Blueprint {
        Blueprint {
            uuid: uuid.into(),
            name: name.into(),
            profile_ids: profiles.iter().map(|p| p.to_string()).collect(),
            apply_at: vec![APPLY_AT_ENROLL.into()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_authenticate_creates_then_refreshes_device() {
        let (_dir, store, _bus, svc) = service();

        dispatch_checkin(&svc, &authenticate("U1"), Some(b"cert".to_vec()))
            .await
            .unwrap();
        let first = store.device_by_udid("U1").unwrap();
        assert!(!first.uuid.is_empty());
        assert_eq!(first.serial_number, "C02TEST");
        assert_eq!(first.os_version, "14.5");
        assert!(!first.enrolled);
        assert_eq!(store.device_by_serial("C02TEST").unwrap().uuid, first.uuid);
        assert_eq!(
            store.udid_cert_hash("U1").unwrap(),
            cert_hash(b"cert").to_vec()
        );

        dispatch_checkin(&svc, &authenticate("U1"), None)
            .await
            .unwrap();
        let second = store.device_by_udid("U1").unwrap();
        assert_eq!(second.uuid, first.uuid);
        assert!(second.last_seen >= first.last_seen);
    }

    #[tokio::test]
    async fn test_authenticate_replaces_record_holding_same_serial() {
        let (_dir, store, _bus, svc) = service();
        store
            .save_device(&Device {
                uuid: "old".into(),
                udid: "OLD-UDID".into(),
                serial_number: "C02TEST".into(),
                ..Default::default()
            })
            .unwrap();

        dispatch_checkin(&svc, &authenticate("U1"), None)
            .await
            .unwrap();
        dispatch_checkin(&svc, &authenticate("U1"), None)
            .await
            .unwrap();

        let dev = store.device_by_serial("C02TEST").unwrap();
        assert_eq!(dev.udid, "U1");
        assert_ne!(dev.uuid, "old");
        assert!(store.device_by_udid("OLD-UDID").unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_first_token_update_applies_enroll_blueprints() {
        let (_dir, store, bus, svc) = service();
        let mut commands = bus.subscribe(Topic::CommandCreated);

        store.save_profile(&profile("com.example.wifi")).unwrap();
        store.save_profile(&profile("com.example.vpn")).unwrap();
        store
            .save_blueprint(&enroll_blueprint(
                "bp1",
                "base",
                &["com.example.wifi", "com.example.vpn"],
            ))
            .unwrap();

        dispatch_checkin(&svc, &authenticate("U1"), None)
            .await
            .unwrap();
        dispatch_checkin(&svc, &token_update("U1"), None)
            .await
            .unwrap();

        let info = store.push_info("U1").unwrap();
        assert_eq!(info.token, vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(info.push_magic, "magic");
        assert!(store.device_by_udid("U1").unwrap().enrolled);

        for _ in 0..2 {
            match commands.try_recv() {
                Some(Event::CommandCreated(ev)) => {
                    assert_eq!(ev.device, DeviceRef::Udid("U1".into()));
                    assert_eq!(ev.request_type, "InstallProfile");
                    assert!(!ev.payload.is_empty());
                }
                other => panic!("expected command, got {other:?}"),
            }
        }
        assert!(commands.try_recv().is_none());

        // token refresh on an existing enrollment does not re-apply
        dispatch_checkin(&svc, &token_update("U1"), None)
            .await
            .unwrap();
        assert!(commands.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_deleted_profile_skips_only_that_blueprint() {
        let (_dir, store, _bus, svc) = service();
        store.save_profile(&profile("keep")).unwrap();
        store.save_profile(&profile("gone")).unwrap();
        store
            .save_blueprint(&enroll_blueprint("bp1", "ok", &["keep"]))
            .unwrap();
        store
            .save_blueprint(&enroll_blueprint("bp2", "broken", &["keep", "gone"]))
            .unwrap();
        store.delete_profile("gone").unwrap();

        let report = svc.apply_blueprints(APPLY_AT_ENROLL, "U1").unwrap();
        assert_eq!(report.commands.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        let (name, err) = &report.skipped[0];
        assert_eq!(name, "broken");
        assert!(
            matches!(err, Error::ValidationFailed { field, reason } if field == "profile_ids" && reason.contains("gone"))
        );
    }

    #[tokio::test]
    async fn test_checkout_completes_queued_removal() {
        let (_dir, store, _bus, svc) = service();
        dispatch_checkin(&svc, &authenticate("U1"), None)
            .await
            .unwrap();
        dispatch_checkin(&svc, &token_update("U1"), None)
            .await
            .unwrap();
        svc.queue_removal("U1", Some("retired".into())).unwrap();
        assert_eq!(
            store.remove_record("U1").unwrap().reason.as_deref(),
            Some("retired")
        );

        dispatch_checkin(&svc, &checkout("U1"), None).await.unwrap();
        assert!(store.remove_record("U1").unwrap_err().is_not_found());
        assert!(!store.device_by_udid("U1").unwrap().enrolled);

        // nothing queued, nothing to complete
        dispatch_checkin(&svc, &checkout("U1"), None).await.unwrap();
    }

    #[tokio::test]
    async fn test_user_channel_records_nothing() {
        let (_dir, store, _bus, svc) = service();
        let msg = message(
            "<key>MessageType</key><string>TokenUpdate</string>
             <key>UDID</key><string>U1</string>
             <key>UserID</key><string>user-1</string>
             <key>Topic</key><string>com.apple.mgmt.test</string>
             <key>Token</key><data>3q2+7w==</data>
             <key>PushMagic</key><string>magic</string>",
        );

        dispatch_checkin(&svc, &msg, None).await.unwrap();
        assert!(store.push_info("U1").unwrap_err().is_not_found());
        assert!(store.device_by_udid("U1").unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_message_without_enrollment_is_rejected() {
        let (_dir, _store, _bus, svc) = service();
        let msg = message(
            "<key>MessageType</key><string>CheckOut</string>
             <key>Topic</key><string>com.apple.mgmt.test</string>",
        );
        assert!(dispatch_checkin(&svc, &msg, None).await.is_err());

        let unsupported = message("<key>MessageType</key><string>DeclarativeManagement</string>");
        dispatch_checkin(&svc, &unsupported, None).await.unwrap();
    }
}
