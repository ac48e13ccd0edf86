//! Enrollment-program credentials and keypair.

use color_eyre::eyre::WrapErr as _;
use mdm_core::{DepKeypair, DepToken};
use mdm_crypto::{
    DEP_CERT_COMMON_NAME, DEP_CERT_VALIDITY_DAYS, DecodedKeypair, decode_dep_keypair,
    generate_dep_keypair,
};
use mdm_events::{CredentialUpdated, EventBus};
use mdm_storage::DepStore;

/// The deployment's enrollment keypair, as stored and decoded.
pub struct EnrollmentKeypair {
    pub stored: DepKeypair,
    pub decoded: DecodedKeypair,
}

/// Token and keypair lifecycle.
#[derive(Clone)]
pub struct TokenService<S> {
    store: S,
    bus: EventBus,
}

impl<S: DepStore> TokenService<S> {
    pub fn new(store: S, bus: EventBus) -> Self {
        Self { store, bus }
    }

    /// Parse, persist and announce a credential.
    pub fn add_token(&self, raw: &[u8]) -> mdm_core::Result<DepToken> {
        let token = DepToken::from_json(raw)?;
        self.store.save_dep_token(&token)?;

        let receivers = self.bus.publish(CredentialUpdated {
            consumer_key: token.consumer_key.clone(),
            raw: raw.to_vec(),
        });
        tracing::info!(consumer_key = %token.consumer_key, receivers, "enrollment token updated");
        Ok(token)
    }

    pub fn dep_tokens(&self) -> mdm_core::Result<Vec<DepToken>> {
        self.store.dep_tokens()
    }

    /// Return the stored keypair, generating and persisting one first if
    /// none exists. Concurrent first-time callers all get the single pair
    /// that ends up stored.
    pub fn get_or_create_keypair(&self) -> color_eyre::eyre::Result<EnrollmentKeypair> {
        let stored = match self
            .store
            .dep_keypair()
            .wrap_err("failed to load enrollment keypair")?
        {
            Some(existing) => existing,
            None => {
                let candidate = generate_dep_keypair(DEP_CERT_COMMON_NAME, DEP_CERT_VALIDITY_DAYS)?;
                self.store
                    .store_dep_keypair_if_absent(&candidate)
                    .wrap_err("failed to store enrollment keypair")?
            }
        };

        let decoded =
            decode_dep_keypair(&stored).wrap_err("stored enrollment keypair is invalid")?;
        Ok(EnrollmentKeypair { stored, decoded })
    }
}
