//! Enrollment-program keypair generation and decoding.

use chrono::Datelike as _;
use color_eyre::eyre::WrapErr as _;
use mdm_core::DepKeypair;
use x509_parser::prelude::*;

/// Common name of the self-signed certificate uploaded to the enrollment program.
pub const DEP_CERT_COMMON_NAME: &str = "mdm-dep-token";

/// Validity of a freshly generated certificate.
pub const DEP_CERT_VALIDITY_DAYS: i64 = 365;

/// Generate an RSA keypair and matching self-signed certificate.
pub fn generate_dep_keypair(common_name: &str, days: i64) -> color_eyre::eyre::Result<DepKeypair> {
    let now = chrono::Utc::now();
    let expiry = now + chrono::TimeDelta::days(days);

    let mut params = rcgen::CertificateParams::new(Vec::<String>::new())
        .wrap_err("failed to create certificate params")?;
    params.distinguished_name = rcgen::DistinguishedName::new();
    params
        .distinguished_name
        .push(rcgen::DnType::CommonName, common_name);
    params.not_before = rcgen::date_time_ymd(now.year(), now.month() as u8, now.day() as u8);
    params.not_after = rcgen::date_time_ymd(expiry.year(), expiry.month() as u8, expiry.day() as u8);

    // the enrollment feed encrypts its token to this certificate with RSA key transport
    let key_pair = rcgen::KeyPair::generate_for(&rcgen::PKCS_RSA_SHA256)
        .wrap_err("failed to generate RSA key pair")?;
    let cert = params
        .self_signed(&key_pair)
        .wrap_err("failed to self-sign certificate")?;

    tracing::info!(common_name, days, "generated enrollment keypair");

    Ok(DepKeypair {
        key_pem: key_pair.serialize_pem(),
        cert_der: cert.der().to_vec(),
    })
}

/// A stored keypair after decoding.
pub struct DecodedKeypair {
    pub key_pair: rcgen::KeyPair,
    pub common_name: Option<String>,
    pub not_after: chrono::DateTime<chrono::Utc>,
}

/// Decode a stored keypair, checking that the certificate belongs to the key.
pub fn decode_dep_keypair(stored: &DepKeypair) -> color_eyre::eyre::Result<DecodedKeypair> {
    let key_pair =
        rcgen::KeyPair::from_pem(&stored.key_pem).wrap_err("failed to parse private key PEM")?;

    let (_, cert) = X509Certificate::from_der(&stored.cert_der)
        .wrap_err("failed to parse certificate DER")?;

    if cert.public_key().raw != key_pair.public_key_der().as_slice() {
        color_eyre::eyre::bail!("certificate does not match private key");
    }

    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_string);

    let not_after = chrono::DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
        .ok_or_else(|| color_eyre::eyre::eyre!("certificate expiry out of range"))?;

    Ok(DecodedKeypair {
        key_pair,
        common_name,
        not_after,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_then_decode() {
        let kp = generate_dep_keypair(DEP_CERT_COMMON_NAME, DEP_CERT_VALIDITY_DAYS).unwrap();
        let decoded = decode_dep_keypair(&kp).unwrap();
        assert_eq!(decoded.common_name.as_deref(), Some(DEP_CERT_COMMON_NAME));
        assert!(decoded.not_after > chrono::Utc::now());
    }

    #[test]
    fn test_certificate_carries_rsa_key() {
        let kp = generate_dep_keypair(DEP_CERT_COMMON_NAME, 1).unwrap();
        let (_, cert) = X509Certificate::from_der(&kp.cert_der).unwrap();
        assert_eq!(
            cert.public_key().algorithm.algorithm,
            x509_parser::oid_registry::OID_PKCS1_RSAENCRYPTION
        );

        let decoded = decode_dep_keypair(&kp).unwrap();
        assert!(decoded.key_pair.is_compatible(&rcgen::PKCS_RSA_SHA256));
    }

    #[test]
    fn test_decode_rejects_mismatched_pair() {
        let a = generate_dep_keypair(DEP_CERT_COMMON_NAME, 1).unwrap();
        let b = generate_dep_keypair(DEP_CERT_COMMON_NAME, 1).unwrap();
        let mixed = DepKeypair {
            key_pem: a.key_pem,
            cert_der: b.cert_der,
        };
        assert!(decode_dep_keypair(&mixed).is_err());
    }
}
