//! Service traits.

use mdm_core::{Authenticate, CheckOut, CheckinMessage, Request, TokenUpdate};

/// Check-in service trait.
#[trait_variant::make(Send)]
pub trait Checkin: Send + Sync {
    /// Handle Authenticate message.
    async fn authenticate(&self, req: &Request, msg: &Authenticate)
    -> color_eyre::eyre::Result<()>;

    /// Handle TokenUpdate message.
    async fn token_update(&self, req: &Request, msg: &TokenUpdate) -> color_eyre::eyre::Result<()>;

    /// Handle CheckOut message.
    async fn checkout(&self, req: &Request, msg: &CheckOut) -> color_eyre::eyre::Result<()>;
}

/// Resolve the enrollment of `msg` and route it to the matching handler.
pub async fn dispatch_checkin<C: Checkin>(
    svc: &C,
    msg: &CheckinMessage,
    certificate: Option<Vec<u8>>,
) -> color_eyre::eyre::Result<()> {
    let Some(id) = msg.enrollment().and_then(|e| e.resolve()) else {
        if matches!(msg, CheckinMessage::Unsupported) {
            tracing::debug!("ignoring unsupported check-in message");
            return Ok(());
        }
        color_eyre::eyre::bail!("check-in message carries no enrollment identifier");
    };

    let mut req = Request::new().with_enroll_id(id);
    if let Some(cert) = certificate {
        req = req.with_certificate(cert);
    }

    match msg {
        CheckinMessage::Authenticate(m) => svc.authenticate(&req, m).await,
        CheckinMessage::TokenUpdate(m) => svc.token_update(&req, m).await,
        CheckinMessage::CheckOut(m) => svc.checkout(&req, m).await,
        CheckinMessage::Unsupported => Ok(()),
    }
}
