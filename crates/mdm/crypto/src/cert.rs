//! Certificate utilities.

use sha2::{Digest as _, Sha256};

/// SHA-256 of a certificate's DER encoding, used to bind an identity
/// certificate to a device UDID.
pub fn cert_hash(cert_der: &[u8]) -> [u8; 32] {
    Sha256::digest(cert_der).into()
}
