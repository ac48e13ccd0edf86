//! Event payloads and topics.

/// Topic an event is published on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// An enrollment-program credential was added or replaced.
    CredentialUpdated,
    /// A management command was created for a device.
    CommandCreated,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CredentialUpdated => "credential-updated",
            Self::CommandCreated => "command-created",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a command's target device is identified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceRef {
    Udid(String),
    /// Devices discovered through the enrollment feed are only known by serial.
    Serial(String),
}

impl std::fmt::Display for DeviceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Udid(udid) => write!(f, "udid {udid}"),
            Self::Serial(serial) => write!(f, "serial {serial}"),
        }
    }
}

/// Payload of [`Topic::CredentialUpdated`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialUpdated {
    pub consumer_key: String,
    /// Raw credential bytes as submitted.
    pub raw: Vec<u8>,
}

/// Payload of [`Topic::CommandCreated`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandCreated {
    pub device: DeviceRef,
    pub command_uuid: String,
    pub request_type: String,
    /// Serialized command, opaque to the bus.
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    CredentialUpdated(CredentialUpdated),
    CommandCreated(CommandCreated),
}

impl Event {
    pub fn topic(&self) -> Topic {
        match self {
            Self::CredentialUpdated(_) => Topic::CredentialUpdated,
            Self::CommandCreated(_) => Topic::CommandCreated,
        }
    }
}

impl From<CredentialUpdated> for Event {
    fn from(ev: CredentialUpdated) -> Self {
        Self::CredentialUpdated(ev)
    }
}

impl From<CommandCreated> for Event {
    fn from(ev: CommandCreated) -> Self {
        Self::CommandCreated(ev)
    }
}
