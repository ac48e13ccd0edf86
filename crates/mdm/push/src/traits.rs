//! Push notification traits.

use mdm_core::{PushInfo, PushResult};

/// Low-level push notification sender.
#[trait_variant::make(Send)]
pub trait Pusher: Send + Sync {
    /// Push notifications to devices, one result per input in order.
    async fn push(&self, infos: &[&PushInfo]) -> Vec<PushResult>;
}

/// Pusher that only logs; used when no APNs certificate is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingPusher;

impl Pusher for LoggingPusher {
    async fn push(&self, infos: &[&PushInfo]) -> Vec<PushResult> {
        infos
            .iter()
            .map(|info| {
                tracing::info!(udid = %info.udid, topic = %info.topic, "push (not sent, no APNs client)");
                PushResult::success(info.udid.clone(), uuid::Uuid::new_v4().to_string())
            })
            .collect()
    }
}
