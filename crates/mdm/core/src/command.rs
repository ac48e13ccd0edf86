//! MDM command construction.

/// MDM command to send to a device.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Command {
    /// Unique command identifier.
    pub command_uuid: String,

    pub command: CommandPayload,
}

/// Command payload wrapper.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CommandPayload {
    /// Request type (e.g., "DeviceInformation", "InstallProfile").
    pub request_type: String,

    /// Additional command-specific fields.
    #[serde(flatten)]
    pub data: std::collections::HashMap<String, plist::Value>,
}

/// Create a new command with generated UUID.
pub fn new_command(request_type: &str) -> Command {
    Command {
        command_uuid: uuid::Uuid::new_v4().to_string(),
        command: CommandPayload {
            request_type: request_type.to_string(),
            data: std::collections::HashMap::new(),
        },
    }
}

/// Build an `InstallProfile` command carrying a mobileconfig payload.
pub fn install_profile_command(payload: &[u8]) -> Command {
    let mut cmd = new_command("InstallProfile");
    cmd.command
        .data
        .insert("Payload".to_string(), plist::Value::Data(payload.to_vec()));
    cmd
}

/// Serialize command to plist bytes.
pub fn serialize_command(cmd: &Command) -> color_eyre::eyre::Result<Vec<u8>> {
    use color_eyre::eyre::WrapErr as _;

    let mut buf = Vec::new();
    plist::to_writer_xml(&mut buf, cmd).wrap_err("failed to serialize command")?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_profile_command() {
        let cmd = install_profile_command(b"<plist/>");
        assert_eq!(cmd.command.request_type, "InstallProfile");

        let bytes = serialize_command(&cmd).unwrap();
        let back: Command = plist::from_bytes(&bytes).unwrap();
        assert_eq!(back.command_uuid, cmd.command_uuid);
        assert!(back.command.data.contains_key("Payload"));
    }
}
