//! Cursor-based device sync with wildcard auto-assignment.

use std::time::Duration;

use color_eyre::eyre::WrapErr as _;
use mdm_core::Cursor;
use mdm_events::{CommandCreated, DeviceRef, EventBus, Topic};
use mdm_storage::DepStore;

use crate::DepClient;

/// Request type of the events published for auto-assigned devices.
pub const ASSIGN_PROFILE_REQUEST: &str = "AssignProfile";

/// Default time between scheduled syncs.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Outcome of one [`SyncEngine::sync_once`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Whether the pass started without a usable cursor.
    pub full_sync: bool,
    pub pages: usize,
    pub devices: usize,
    pub assigned: usize,
}

/// Pulls the enrollment feed and applies auto-assigners to new devices.
pub struct SyncEngine<S, C> {
    store: S,
    client: C,
    bus: EventBus,
    interval: Duration,
}

impl<S, C> SyncEngine<S, C>
where
    S: DepStore,
    C: DepClient,
{
    pub fn new(store: S, client: C, bus: EventBus) -> Self {
        Self {
            store,
            client,
            bus,
            interval: DEFAULT_SYNC_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Page through the feed until it reports nothing more to follow.
    ///
    /// The cursor is saved after each page is fully processed, so a failure
    /// resumes from the last completed page.
    pub async fn sync_once(&self) -> color_eyre::eyre::Result<SyncReport> {
        let mut cursor = self
            .store
            .load_cursor()
            .wrap_err("failed to load sync cursor")?;

        if let Some(c) = &cursor {
            if c.is_expired(chrono::Utc::now()) {
                tracing::info!(cursor = %c.value, "sync cursor expired, starting full sync");
                cursor = None;
            }
        }

        let mut report = SyncReport {
            full_sync: cursor.is_none(),
            ..Default::default()
        };

        loop {
            let page = self
                .client
                .fetch_devices(cursor.as_ref())
                .await
                .wrap_err("failed to fetch enrollment devices")?;

            let new_serials: Vec<String> = page
                .devices
                .iter()
                .filter(|d| d.is_newly_seen())
                .map(|d| d.serial_number.clone())
                .collect();

            report.pages += 1;
            report.devices += page.devices.len();
            report.assigned += self.auto_assign(&new_serials).await?;

            let next = Cursor::new(page.cursor);
            self.store
                .save_cursor(&next)
                .wrap_err("failed to save sync cursor")?;
            tracing::debug!(cursor = %next.value, devices = page.devices.len(), "sync cursor advanced");
            cursor = Some(next);

            if !page.more_to_follow {
                break;
            }
        }

        tracing::info!(
            full_sync = report.full_sync,
            pages = report.pages,
            devices = report.devices,
            assigned = report.assigned,
            "enrollment sync complete"
        );
        Ok(report)
    }

    async fn auto_assign(&self, serials: &[String]) -> color_eyre::eyre::Result<usize> {
        if serials.is_empty() {
            return Ok(0);
        }

        let assigners = self
            .store
            .load_auto_assigners()
            .wrap_err("failed to load auto-assigners")?;

        let mut assigned = 0;
        for assigner in &assigners {
            let matched: Vec<String> = serials
                .iter()
                .filter(|s| assigner.matches(s))
                .cloned()
                .collect();
            if matched.is_empty() {
                continue;
            }

            self.client
                .assign_profile(&assigner.profile_uuid, &matched)
                .await
                .wrap_err_with(|| format!("failed to assign profile {}", assigner.profile_uuid))?;

            for serial in &matched {
                self.bus.publish(CommandCreated {
                    device: DeviceRef::Serial(serial.clone()),
                    command_uuid: uuid::Uuid::new_v4().to_string(),
                    request_type: ASSIGN_PROFILE_REQUEST.to_string(),
                    payload: assigner.profile_uuid.clone().into_bytes(),
                });
            }

            tracing::info!(
                filter = %assigner.filter,
                profile = %assigner.profile_uuid,
                devices = matched.len(),
                "auto-assigned enrollment profile"
            );
            assigned += matched.len();
        }

        Ok(assigned)
    }

    /// Sync on every interval tick and whenever a credential is updated,
    /// until `shutdown` resolves. Failed passes are logged and retried on
    /// the next trigger.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        let mut credentials = self.bus.subscribe(Topic::CredentialUpdated);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        tracing::info!(interval = ?self.interval, "enrollment sync engine started");

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = ticker.tick() => {}
                event = credentials.recv() => match event {
                    Some(_) => tracing::debug!("credential updated, syncing"),
                    None => break,
                },
            }

            if let Err(e) = self.sync_once().await {
                tracing::error!(error = ?e, "enrollment sync failed");
            }
        }

        tracing::info!("enrollment sync engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use mdm_core::AutoAssigner;
    use mdm_events::{CredentialUpdated, Event};
    use mdm_storage::{RedbStore, Storage};

    use super::*;
    use crate::{DepDevice, DevicePage, OpType};

    #[derive(Default)]
    struct FakeFeed {
        pages: Mutex<VecDeque<color_eyre::eyre::Result<DevicePage>>>,
        cursors: Mutex<Vec<Option<String>>>,
        assignments: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl FakeFeed {
        fn push_page(&self, serials: &[(&str, Option<OpType>)], cursor: &str, more: bool) {
            let devices = serials
                .iter()
                .map(|(serial, op)| DepDevice {
                    serial_number: serial.to_string(),
                    model: "iPad".into(),
                    description: String::new(),
                    op_type: *op,
                    op_date: None,
                })
                .collect();
            self.pages.lock().unwrap().push_back(Ok(DevicePage {
                devices,
                cursor: cursor.into(),
                more_to_follow: more,
            }));
        }
    }

    impl DepClient for Arc<FakeFeed> {
        async fn fetch_devices(
            &self,
            cursor: Option<&Cursor>,
        ) -> color_eyre::eyre::Result<DevicePage> {
            self.cursors
                .lock()
                .unwrap()
                .push(cursor.map(|c| c.value.clone()));
            self.pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(DevicePage::default()))
        }

        async fn assign_profile(
            &self,
            profile_uuid: &str,
            serials: &[String],
        ) -> color_eyre::eyre::Result<()> {
            self.assignments
                .lock()
                .unwrap()
                .push((profile_uuid.to_string(), serials.to_vec()));
            Ok(())
        }
    }

    fn engine() -> (
        tempfile::TempDir,
        Storage<RedbStore>,
        Arc<FakeFeed>,
        EventBus,
        SyncEngine<Storage<RedbStore>, Arc<FakeFeed>>,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let store = Storage::new(RedbStore::open(&dir.path().join("mdm.redb")).unwrap());
        let feed = Arc::new(FakeFeed::default());
        let bus = EventBus::default();
        let engine = SyncEngine::new(store.clone(), Arc::clone(&feed), bus.clone());
        (dir, store, feed, bus, engine)
    }

    #[tokio::test]
    async fn test_full_sync_then_resume_from_cursor() {
        let (_dir, store, feed, _bus, engine) = engine();
        feed.push_page(&[("S1", None)], "c1", true);
        feed.push_page(&[("S2", None)], "c2", false);

        let report = engine.sync_once().await.unwrap();
        assert!(report.full_sync);
        assert_eq!(report.pages, 2);
        assert_eq!(report.devices, 2);
        assert_eq!(store.load_cursor().unwrap().unwrap().value, "c2");

        feed.push_page(&[], "c3", false);
        let report = engine.sync_once().await.unwrap();
        assert!(!report.full_sync);

        let cursors = feed.cursors.lock().unwrap().clone();
        assert_eq!(cursors, vec![None, Some("c1".into()), Some("c2".into())]);
    }

    #[tokio::test]
    async fn test_expired_cursor_forces_full_sync() {
        let (_dir, store, feed, _bus, engine) = engine();
        store
            .save_cursor(&Cursor {
                value: "stale".into(),
                created_at: Some(chrono::Utc::now() - chrono::TimeDelta::days(8)),
            })
            .unwrap();
        feed.push_page(&[], "fresh", false);

        let report = engine.sync_once().await.unwrap();
        assert!(report.full_sync);
        assert_eq!(feed.cursors.lock().unwrap()[0], None);
    }

    #[tokio::test]
    async fn test_new_devices_are_auto_assigned() {
        let (_dir, store, feed, bus, engine) = engine();
        store
            .save_auto_assigner(&AutoAssigner {
                filter: "*".into(),
                profile_uuid: "PROFILE-1".into(),
            })
            .unwrap();
        let mut commands = bus.subscribe(Topic::CommandCreated);

        feed.push_page(
            &[
                ("S1", Some(OpType::Added)),
                ("S2", Some(OpType::Modified)),
                ("S3", Some(OpType::Deleted)),
                ("S4", None),
            ],
            "c1",
            false,
        );

        let report = engine.sync_once().await.unwrap();
        assert_eq!(report.assigned, 2);

        let assignments = feed.assignments.lock().unwrap().clone();
        assert_eq!(
            assignments,
            vec![("PROFILE-1".to_string(), vec!["S1".to_string(), "S4".to_string()])]
        );

        let mut targets = Vec::new();
        while let Some(Event::CommandCreated(ev)) = commands.try_recv() {
            assert_eq!(ev.request_type, ASSIGN_PROFILE_REQUEST);
            targets.push(ev.device);
        }
        assert_eq!(
            targets,
            vec![DeviceRef::Serial("S1".into()), DeviceRef::Serial("S4".into())]
        );
    }

    #[tokio::test]
    async fn test_no_assigners_means_no_assignment() {
        let (_dir, _store, feed, _bus, engine) = engine();
        feed.push_page(&[("S1", None)], "c1", false);

        let report = engine.sync_once().await.unwrap();
        assert_eq!(report.assigned, 0);
        assert!(feed.assignments.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_page_keeps_previous_cursor() {
        let (_dir, store, feed, _bus, engine) = engine();
        feed.push_page(&[], "c1", true);
        feed.pages
            .lock()
            .unwrap()
            .push_back(Err(color_eyre::eyre::eyre!("feed unavailable")));

        assert!(engine.sync_once().await.is_err());
        assert_eq!(store.load_cursor().unwrap().unwrap().value, "c1");
    }

    #[tokio::test]
    async fn test_run_syncs_on_credential_update_until_shutdown() {
        let (_dir, _store, feed, bus, engine) = engine();
        let engine = Arc::new(engine.with_interval(Duration::from_secs(3600)));
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        let runner = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                engine
                    .run(async {
                        let _ = stop_rx.await;
                    })
                    .await
            })
        };

        // first tick fires immediately
        wait_for_fetches(&feed, 1).await;

        bus.publish(CredentialUpdated {
            consumer_key: "CK_test".into(),
            raw: b"{}".to_vec(),
        });
        wait_for_fetches(&feed, 2).await;

        stop_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), runner)
            .await
            .unwrap()
            .unwrap();
    }

    async fn wait_for_fetches(feed: &FakeFeed, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while feed.cursors.lock().unwrap().len() < n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }
}
