//! Consumes command-created events and wakes the target device.

use mdm_core::{PushInfo, PushResult};
use mdm_events::{CommandCreated, DeviceRef, Event, EventBus, Topic};
use mdm_storage::{DeviceStore, PushStore};

use crate::Pusher;

/// Routes command-created events to the push transport.
pub struct PushCoordinator<S, P> {
    store: S,
    pusher: P,
    bus: EventBus,
}

impl<S, P> PushCoordinator<S, P>
where
    S: DeviceStore + PushStore,
    P: Pusher,
{
    pub fn new(store: S, pusher: P, bus: EventBus) -> Self {
        Self { store, pusher, bus }
    }

    /// Push routing for a command target. Serial references go through the
    /// device index to find the UDID.
    pub fn resolve(&self, device: &DeviceRef) -> mdm_core::Result<PushInfo> {
        let udid = match device {
            DeviceRef::Udid(udid) => udid.clone(),
            DeviceRef::Serial(serial) => self.store.device_by_serial(serial)?.udid,
        };
        self.store.push_info(&udid)
    }

    /// Wake the device a command was created for.
    ///
    /// Fails with NotFound when the device has no push registration; the
    /// command then waits for the device's next check-in.
    pub async fn dispatch(&self, ev: &CommandCreated) -> mdm_core::Result<PushResult> {
        let info = self.resolve(&ev.device)?;

        let result = self
            .pusher
            .push(&[&info])
            .await
            .into_iter()
            .next()
            .unwrap_or_else(|| PushResult::failure(info.udid.clone(), "pusher returned no result"));

        if result.is_success() {
            tracing::debug!(udid = %info.udid, command_uuid = %ev.command_uuid, "device woken");
        } else {
            tracing::warn!(
                udid = %info.udid,
                command_uuid = %ev.command_uuid,
                error = result.error.as_deref().unwrap_or_default(),
                "push failed"
            );
        }
        Ok(result)
    }

    /// Dispatch every command-created event until `shutdown` resolves.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        let mut commands = self.bus.subscribe(Topic::CommandCreated);
        tokio::pin!(shutdown);

        tracing::info!("push coordinator started");

        loop {
            let ev = tokio::select! {
                () = &mut shutdown => break,
                event = commands.recv() => match event {
                    Some(Event::CommandCreated(ev)) => ev,
                    Some(_) => continue,
                    None => break,
                },
            };

            if let Err(e) = self.dispatch(&ev).await {
                tracing::warn!(
                    device = %ev.device,
                    command_uuid = %ev.command_uuid,
                    request_type = %ev.request_type,
                    error = %e,
                    "push deferred to next check-in"
                );
            }
        }

        tracing::info!("push coordinator stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use mdm_core::Device;
    use mdm_storage::{RedbStore, Storage};

    use super::*;

    #[derive(Default)]
    struct RecordingPusher {
        pushed: Mutex<Vec<PushInfo>>,
    }

    impl Pusher for Arc<RecordingPusher> {
        async fn push(&self, infos: &[&PushInfo]) -> Vec<PushResult> {
            let mut pushed = self.pushed.lock().unwrap();
            infos
                .iter()
                .map(|info| {
                    pushed.push((*info).clone());
                    PushResult::success(info.udid.clone(), "apns-id".into())
                })
                .collect()
        }
    }

    fn coordinator() -> (
        tempfile::TempDir,
        Storage<RedbStore>,
        Arc<RecordingPusher>,
        EventBus,
        PushCoordinator<Storage<RedbStore>, Arc<RecordingPusher>>,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let store = Storage::new(RedbStore::open(&dir.path().join("mdm.redb")).unwrap());
        let pusher = Arc::new(RecordingPusher::default());
        let bus = EventBus::default();
        let coord = PushCoordinator::new(store.clone(), Arc::clone(&pusher), bus.clone());
        (dir, store, pusher, bus, coord)
    }

    fn push_info(udid: &str) -> PushInfo {
        PushInfo {
            udid: udid.into(),
            token: vec![0xab, 0xcd],
            push_magic: "magic".into(),
            topic: "com.apple.mgmt.test".into(),
        }
    }

    fn command(device: DeviceRef) -> CommandCreated {
        CommandCreated {
            device,
            command_uuid: "cmd-1".into(),
            request_type: "InstallProfile".into(),
            payload: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_dispatch_by_udid() {
        let (_dir, store, pusher, _bus, coord) = coordinator();
        store.save_push_info(&push_info("u1")).unwrap();

        let result = coord
            .dispatch(&command(DeviceRef::Udid("u1".into())))
            .await
            .unwrap();
        assert!(result.is_success());
        assert_eq!(pusher.pushed.lock().unwrap()[0], push_info("u1"));
    }

    #[tokio::test]
    async fn test_dispatch_by_serial_uses_device_index() {
        let (_dir, store, pusher, _bus, coord) = coordinator();
        store
            .save_device(&Device {
                uuid: "1".into(),
                udid: "u1".into(),
                serial_number: "S1".into(),
                ..Default::default()
            })
            .unwrap();
        store.save_push_info(&push_info("u1")).unwrap();

        coord
            .dispatch(&command(DeviceRef::Serial("S1".into())))
            .await
            .unwrap();
        assert_eq!(pusher.pushed.lock().unwrap()[0].udid, "u1");
    }

    #[tokio::test]
    async fn test_missing_registration_is_reported() {
        let (_dir, _store, pusher, _bus, coord) = coordinator();

        let err = coord
            .dispatch(&command(DeviceRef::Udid("ghost".into())))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            mdm_core::Error::NotFound {
                resource: mdm_core::Resource::PushInfo,
                ..
            }
        ));

        let err = coord
            .dispatch(&command(DeviceRef::Serial("unknown".into())))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(pusher.pushed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_dispatches_published_commands() {
        let (_dir, store, pusher, bus, coord) = coordinator();
        store.save_push_info(&push_info("u1")).unwrap();
        let coord = Arc::new(coord);
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        let runner = {
            let coord = Arc::clone(&coord);
            tokio::spawn(async move {
                coord
                    .run(async {
                        let _ = stop_rx.await;
                    })
                    .await
            })
        };

        // wait until the coordinator has subscribed
        tokio::time::timeout(Duration::from_secs(5), async {
            while bus.publish(command(DeviceRef::Udid("missing".into()))) == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        bus.publish(command(DeviceRef::Udid("u1".into())));
        tokio::time::timeout(Duration::from_secs(5), async {
            while pusher.pushed.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        stop_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), runner)
            .await
            .unwrap()
            .unwrap();
    }
}
