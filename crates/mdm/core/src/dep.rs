//! Enrollment-program (DEP) records.

use crate::{Error, Record, Resource, Result};

/// Only filter value accepted for auto-assigners.
pub const WILDCARD_FILTER: &str = "*";

/// Consumer-key prefix of stored enrollment tokens.
pub const TOKEN_KEY_PREFIX: &str = "CK_";

/// Days the enrollment feed honours a cursor.
pub const CURSOR_VALIDITY_DAYS: i64 = 7;

/// Opaque pagination token handed out by the enrollment feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Cursor {
    pub value: String,
    #[serde(default)]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Record for Cursor {
    const RESOURCE: Resource = Resource::DepCursor;
}

impl Cursor {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            created_at: Some(chrono::Utc::now()),
        }
    }

    /// A cursor older than [`CURSOR_VALIDITY_DAYS`] is rejected by the feed.
    pub fn is_expired(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        match self.created_at {
            Some(created) => now - created > chrono::TimeDelta::days(CURSOR_VALIDITY_DAYS),
            None => false,
        }
    }
}

/// Assigns an enrollment profile to devices discovered by the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AutoAssigner {
    /// Device filter; currently only [`WILDCARD_FILTER`].
    pub filter: String,
    pub profile_uuid: String,
}

impl Record for AutoAssigner {
    const RESOURCE: Resource = Resource::AutoAssigner;
}

impl AutoAssigner {
    pub fn verify(&self) -> Result<()> {
        if self.filter != WILDCARD_FILTER {
            return Err(Error::validation(
                "filter",
                format!("only '{WILDCARD_FILTER}' filter auto-assigners supported"),
            ));
        }
        if self.profile_uuid.is_empty() {
            return Err(Error::validation("profile_uuid", "auto-assigner needs a profile UUID"));
        }
        Ok(())
    }

    /// Whether this assigner applies to the device with `serial`.
    pub fn matches(&self, _serial: &str) -> bool {
        self.filter == WILDCARD_FILTER
    }
}

/// OAuth credential for one enrollment-program account.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DepToken {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub access_token: String,
    pub access_secret: String,
    #[serde(default)]
    pub access_token_expiry: Option<chrono::DateTime<chrono::Utc>>,
}

impl Record for DepToken {
    const RESOURCE: Resource = Resource::DepToken;
}

impl DepToken {
    /// Parse and validate a token from its JSON form.
    pub fn from_json(json: &[u8]) -> Result<Self> {
        let token: DepToken = serde_json::from_slice(json)
            .map_err(|e| Error::validation("token", format!("malformed token JSON: {e}")))?;
        if !token.consumer_key.starts_with(TOKEN_KEY_PREFIX) {
            return Err(Error::validation(
                "consumer_key",
                format!("must start with {TOKEN_KEY_PREFIX}"),
            ));
        }
        Ok(token)
    }
}

/// Stored enrollment keypair: PEM private key and DER self-signed certificate.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DepKeypair {
    pub key_pem: String,
    pub cert_der: Vec<u8>,
}

impl Record for DepKeypair {
    const RESOURCE: Resource = Resource::DepKeypair;
}
