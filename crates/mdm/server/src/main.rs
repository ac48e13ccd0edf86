//! MDM Server - device lifecycle backend.

use color_eyre::eyre::WrapErr as _;
use mdm_server::{AnyPusher, Backend, Config, Mdm, open_document, open_embedded};

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = Config::load().wrap_err("failed to load configuration")?;
    tracing::info!(backend = ?config.storage.backend, "mdm-server starting");

    let pusher = AnyPusher::from_config(config.apns.as_ref())?;

    match config.storage.backend {
        Backend::Embedded => {
            let mdm = Mdm::new(open_embedded(&config.storage)?, config);
            mdm.run(pusher, shutdown_signal()).await
        }
        Backend::Document => {
            let mdm = Mdm::new(open_document(&config.storage)?, config);
            mdm.run(pusher, shutdown_signal()).await
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
    }
    tracing::info!("shutdown requested");
}
