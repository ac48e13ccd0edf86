//! APNs push implementation using the a2 crate.

use a2::NotificationBuilder as _;
use color_eyre::eyre::WrapErr as _;
use mdm_core::{PushInfo, PushResult};

use crate::Pusher;

/// APNs pusher using certificate authentication.
pub struct ApnsPusher {
    client: a2::Client,
}

impl ApnsPusher {
    /// Create a production pusher from PKCS12 certificate bytes and password.
    pub fn new(pkcs12_der: &[u8], password: &str) -> color_eyre::eyre::Result<Self> {
        Self::with_endpoint(pkcs12_der, password, a2::Endpoint::Production)
    }

    /// Create a pusher for the sandbox environment.
    pub fn sandbox(pkcs12_der: &[u8], password: &str) -> color_eyre::eyre::Result<Self> {
        Self::with_endpoint(pkcs12_der, password, a2::Endpoint::Sandbox)
    }

    fn with_endpoint(
        pkcs12_der: &[u8],
        password: &str,
        endpoint: a2::Endpoint,
    ) -> color_eyre::eyre::Result<Self> {
        let mut cursor = std::io::Cursor::new(pkcs12_der);
        let config = a2::ClientConfig::new(endpoint);

        let client = a2::Client::certificate(&mut cursor, password, config)
            .wrap_err("failed to create APNs client")?;

        Ok(Self { client })
    }

    async fn push_single(&self, info: &PushInfo) -> PushResult {
        let token = info.token_hex();

        let mut payload = a2::DefaultNotificationBuilder::new().build(
            &token,
            a2::NotificationOptions {
                apns_topic: Some(&info.topic),
                ..Default::default()
            },
        );
        // MDM wake-ups carry only {"mdm": "<push_magic>"}
        if let Err(e) = payload.add_custom_data("mdm", &info.push_magic) {
            return PushResult::failure(info.udid.clone(), e);
        }

        match self.client.send(payload).await {
            Ok(response) => {
                let apns_id = response.apns_id.unwrap_or_default();
                tracing::debug!(udid = %info.udid, apns_id = %apns_id, "push sent");
                PushResult::success(info.udid.clone(), apns_id)
            }
            Err(e) => PushResult::failure(info.udid.clone(), e),
        }
    }
}

impl Pusher for ApnsPusher {
    async fn push(&self, infos: &[&PushInfo]) -> Vec<PushResult> {
        let mut results = Vec::with_capacity(infos.len());

        for info in infos {
            let result = self.push_single(info).await;
            results.push(result);
        }

        results
    }
}
