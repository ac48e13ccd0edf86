//! Configuration profiles.

use crate::{Error, Record, Resource, Result};

/// A configuration profile, keyed by its identifier.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Profile {
    /// Profile identifier (the payload's `PayloadIdentifier`).
    pub identifier: String,
    /// Raw mobileconfig property list.
    pub payload: Vec<u8>,
}

impl Record for Profile {
    const RESOURCE: Resource = Resource::Profile;
}

impl Profile {
    /// Check the identifier and that the payload is a well-formed property
    /// list dictionary whose `PayloadIdentifier`, if present, matches.
    pub fn validate(&self) -> Result<()> {
        if self.identifier.is_empty() {
            return Err(Error::validation("identifier", "profile must have an identifier"));
        }
        if self.payload.is_empty() {
            return Err(Error::validation("payload", "profile payload is empty"));
        }

        let value: plist::Value = plist::from_bytes(&self.payload)
            .map_err(|e| Error::validation("payload", format!("malformed property list: {e}")))?;
        let dict = value
            .into_dictionary()
            .ok_or_else(|| Error::validation("payload", "property list is not a dictionary"))?;

        if let Some(id) = dict.get("PayloadIdentifier") {
            let id = id
                .as_string()
                .ok_or_else(|| Error::validation("payload", "PayloadIdentifier is not a string"))?;
            if id != self.identifier {
                return Err(Error::validation(
                    "identifier",
                    format!("does not match PayloadIdentifier {id}"),
                ));
            }
        }

        Ok(())
    }
}
