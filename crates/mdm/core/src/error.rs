//! Error kinds shared by every entity store.

/// Boxed error source carried by storage and codec failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used throughout the storage layer.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Kind of record an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Device,
    Profile,
    Blueprint,
    PushInfo,
    DepCursor,
    AutoAssigner,
    DepToken,
    DepKeypair,
    RemoveDevice,
    CertAuth,
    User,
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Device => "Device",
            Self::Profile => "Profile",
            Self::Blueprint => "Blueprint",
            Self::PushInfo => "PushInfo",
            Self::DepCursor => "DEPCursor",
            Self::AutoAssigner => "AutoAssigner",
            Self::DepToken => "DEPToken",
            Self::DepKeypair => "DEPKeypair",
            Self::RemoveDevice => "RemoveDevice",
            Self::CertAuth => "UDIDCertAuth",
            Self::User => "User",
        };
        f.write_str(name)
    }
}

/// Unified storage and validation error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Absent key or record.
    #[error("not found: {resource} {detail}")]
    NotFound { resource: Resource, detail: String },

    /// Malformed or referentially invalid entity.
    #[error("validation failed: {field}: {reason}")]
    ValidationFailed { field: String, reason: String },

    /// Uniqueness violation.
    #[error("conflict: {reason}")]
    Conflict { reason: String },

    /// Deadline exceeded while waiting for the writer lock.
    #[error("timed out waiting for writer lock: {operation}")]
    Timeout { operation: String },

    /// Record could not be encoded or decoded.
    #[error("codec error for {resource}")]
    Codec {
        resource: Resource,
        #[source]
        source: BoxError,
    },

    /// Backend I/O failure.
    #[error("storage failure: {operation}")]
    Storage {
        operation: String,
        #[source]
        source: BoxError,
    },
}

impl Error {
    pub fn not_found(resource: Resource, detail: impl Into<String>) -> Self {
        Self::NotFound {
            resource,
            detail: detail.into(),
        }
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ValidationFailed {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict {
            reason: reason.into(),
        }
    }

    pub fn storage(operation: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Storage {
            operation: operation.into(),
            source: source.into(),
        }
    }

    pub fn codec(resource: Resource, source: impl Into<BoxError>) -> Self {
        Self::Codec {
            resource,
            source: source.into(),
        }
    }

    /// True for [`Error::NotFound`] regardless of resource.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Extension for turning `NotFound` into `None`.
pub trait OptionalExt<T> {
    /// Map a `NotFound` error to `Ok(None)`, keeping every other error.
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for Result<T> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
