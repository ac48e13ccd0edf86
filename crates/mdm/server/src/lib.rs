//! MDM Server
//!
//! Configuration loading and component wiring for the `mdm-server` binary.

mod config;

use std::sync::Arc;

use color_eyre::eyre::WrapErr as _;
use mdm_core::{PushInfo, PushResult};
use mdm_dep::{DepClient, SyncEngine, TokenService};
use mdm_events::EventBus;
use mdm_push::{ApnsPusher, LoggingPusher, PushCoordinator, Pusher};
use mdm_service::Lifecycle;
use mdm_storage::{DocumentStore, KeyedStore, RedbStore, Storage};

pub use config::*;

/// The configured push transport.
pub enum AnyPusher {
    Apns(ApnsPusher),
    Logging(LoggingPusher),
}

impl AnyPusher {
    /// APNs when a certificate is configured, otherwise log-only.
    pub fn from_config(apns: Option<&ApnsConfig>) -> color_eyre::eyre::Result<Self> {
        let Some(apns) = apns else {
            tracing::warn!("no APNs certificate configured, pushes will only be logged");
            return Ok(Self::Logging(LoggingPusher));
        };

        let pkcs12 = std::fs::read(&apns.cert_path).wrap_err_with(|| {
            format!("failed to read APNs certificate {}", apns.cert_path.display())
        })?;
        let pusher = if apns.sandbox {
            ApnsPusher::sandbox(&pkcs12, &apns.password)?
        } else {
            ApnsPusher::new(&pkcs12, &apns.password)?
        };
        tracing::info!(sandbox = apns.sandbox, "APNs client ready");
        Ok(Self::Apns(pusher))
    }
}

impl Pusher for AnyPusher {
    async fn push(&self, infos: &[&PushInfo]) -> Vec<PushResult> {
        match self {
            Self::Apns(p) => p.push(infos).await,
            Self::Logging(p) => p.push(infos).await,
        }
    }
}

pub fn open_embedded(config: &StorageConfig) -> color_eyre::eyre::Result<RedbStore> {
    RedbStore::open(&config.path)
        .wrap_err_with(|| format!("failed to open {}", config.path.display()))
}

pub fn open_document(config: &StorageConfig) -> color_eyre::eyre::Result<DocumentStore> {
    DocumentStore::new(&config.url, config.pool_size).wrap_err("failed to initialize storage")
}

/// Shared handles for one running deployment.
pub struct Mdm<S> {
    store: Storage<S>,
    bus: EventBus,
    config: Arc<Config>,
}

impl<S> Clone for Mdm<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            bus: self.bus.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S: KeyedStore> Mdm<S> {
    pub fn new(kv: S, config: Config) -> Self {
        let store = Storage::new(kv).with_write_timeout(config.storage.write_timeout());
        let bus = EventBus::new(config.events.capacity);
        Self {
            store,
            bus,
            config: Arc::new(config),
        }
    }

    pub fn store(&self) -> &Storage<S> {
        &self.store
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn lifecycle(&self) -> Lifecycle<Storage<S>> {
        Lifecycle::new(self.store.clone(), self.bus.clone())
    }

    pub fn tokens(&self) -> TokenService<Storage<S>> {
        TokenService::new(self.store.clone(), self.bus.clone())
    }

    /// Sync engine over an enrollment feed client supplied by the embedder.
    pub fn sync_engine<C: DepClient>(&self, client: C) -> SyncEngine<Storage<S>, C> {
        SyncEngine::new(self.store.clone(), client, self.bus.clone())
            .with_interval(self.config.dep.sync_interval())
    }

    pub fn push_coordinator<P: Pusher>(&self, pusher: P) -> PushCoordinator<Storage<S>, P> {
        PushCoordinator::new(self.store.clone(), pusher, self.bus.clone())
    }

    fn prepare_keypair(&self) -> color_eyre::eyre::Result<()> {
        let keypair = self
            .tokens()
            .get_or_create_keypair()
            .wrap_err("failed to prepare enrollment keypair")?;
        tracing::info!(
            common_name = keypair.decoded.common_name.as_deref().unwrap_or_default(),
            not_after = %keypair.decoded.not_after,
            "enrollment keypair ready"
        );
        Ok(())
    }

    /// Prepare the enrollment keypair, then dispatch pushes until `shutdown`
    /// resolves.
    pub async fn run<P: Pusher + 'static>(
        &self,
        pusher: P,
        shutdown: impl Future<Output = ()>,
    ) -> color_eyre::eyre::Result<()> {
        self.prepare_keypair()?;

        let coordinator = self.push_coordinator(pusher);
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let push = tokio::spawn(async move {
            coordinator
                .run(async {
                    let _ = stop_rx.await;
                })
                .await;
        });

        tracing::info!(consistency = ?self.store.consistency(), "mdm-server running");
        shutdown.await;

        let _ = stop_tx.send(());
        push.await.wrap_err("push coordinator task failed")?;
        tracing::info!("mdm-server stopped");
        Ok(())
    }
}
