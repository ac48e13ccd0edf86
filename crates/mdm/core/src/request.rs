//! MDM request context.

use crate::EnrollId;

/// Carries enrollment identification and certificate info into the service layer.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub enroll_id: Option<EnrollId>,

    /// Device identity certificate (DER-encoded).
    pub certificate: Option<Vec<u8>>,
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enroll_id(mut self, id: EnrollId) -> Self {
        self.enroll_id = Some(id);
        self
    }

    pub fn with_certificate(mut self, cert: Vec<u8>) -> Self {
        self.certificate = Some(cert);
        self
    }

    /// Get the enrollment ID, returning an error if not set.
    pub fn require_enroll_id(&self) -> color_eyre::eyre::Result<&EnrollId> {
        self.enroll_id
            .as_ref()
            .ok_or_else(|| color_eyre::eyre::eyre!("enrollment ID not resolved"))
    }
}
