//! Outbound device commands.

/// Kind of instruction queued for a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    /// Create or update a user on the device.
    SetUser,
    /// Remove a user from the device.
    DeleteUser,
    /// Set the device clock.
    SyncTime,
    /// Restart the device.
    Reboot,
    /// Wipe the device's attendance log.
    ClearLog,
    /// Ask the device to report its info.
    Info,
    /// Raw payload supplied by an administrator.
    Custom,
}

impl CommandType {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SetUser => "set_user",
            Self::DeleteUser => "delete_user",
            Self::SyncTime => "sync_time",
            Self::Reboot => "reboot",
            Self::ClearLog => "clear_log",
            Self::Info => "info",
            Self::Custom => "custom",
        }
    }

    /// Parse the storage representation.
    pub fn from_db(value: &str) -> Self {
        match value {
            "set_user" => Self::SetUser,
            "delete_user" => Self::DeleteUser,
            "sync_time" => Self::SyncTime,
            "reboot" => Self::Reboot,
            "clear_log" => Self::ClearLog,
            "info" => Self::Info,
            _ => Self::Custom,
        }
    }
}

/// Command lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    /// Waiting for the device to poll.
    Pending,
    /// Handed to the device, awaiting acknowledgement.
    Sent,
    /// Device reported success.
    Executed,
    /// Device reported failure.
    Failed,
}

impl CommandStatus {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Executed => "executed",
            Self::Failed => "failed",
        }
    }

    /// Parse the storage representation.
    pub fn from_db(value: &str) -> Self {
        match value {
            "sent" => Self::Sent,
            "executed" => Self::Executed,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }

    /// Whether the command has reached a final state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Executed | Self::Failed)
    }
}

impl std::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A queued instruction.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DeviceCommand {
    /// Storage identifier.
    pub id: i64,
    /// Stable command identifier.
    pub uuid: String,
    /// Target device.
    pub device_id: i64,
    /// Kind of instruction.
    pub command_type: CommandType,
    /// Raw protocol payload.
    pub payload: String,
    /// Lifecycle state.
    pub status: CommandStatus,
    /// When it was queued.
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// When it was handed to the device.
    pub sent_at: Option<chrono::DateTime<chrono::Utc>>,
    /// When the device acknowledged it.
    pub executed_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Raw return code from the device.
    pub return_value: Option<String>,
}

/// Result of applying an acknowledgement.
#[derive(Debug, Clone, PartialEq)]
pub enum AckOutcome {
    /// The command moved to a terminal state.
    Recorded(DeviceCommand),
    /// The command was already terminal; nothing changed.
    AlreadyTerminal(DeviceCommand),
    /// No such command on this device.
    Unknown,
}

/// Return code meaning success.
pub const RETURN_OK: &str = "0";

/// Whether a device return code means success.
pub fn is_success(return_code: &str) -> bool {
    return_code.trim() == RETURN_OK
}

/// Create a new command identifier.
pub fn new_command_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Strip characters that would break the tab/line framing of a payload field.
fn sanitize(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, '\t' | '\r' | '\n'))
        .collect()
}

/// Payload creating or updating a user.
pub fn set_user_payload(device_user_id: &str, name: &str, privilege: u8) -> String {
    format!(
        "DATA UPDATE USERINFO PIN={}\tName={}\tPri={}",
        sanitize(device_user_id),
        sanitize(name),
        privilege
    )
}

/// Payload removing a user.
pub fn delete_user_payload(device_user_id: &str) -> String {
    format!("DATA DELETE USERINFO PIN={}", sanitize(device_user_id))
}

/// Payload setting the device clock to a device-local reading.
pub fn sync_time_payload(device_local: chrono::NaiveDateTime) -> String {
    format!("SET OPTIONS DateTime={}", crate::format_timestamp(device_local))
}

/// Payload restarting the device.
pub const REBOOT_PAYLOAD: &str = "REBOOT";

/// Payload clearing the attendance log.
pub const CLEAR_LOG_PAYLOAD: &str = "CLEAR LOG";

/// Payload requesting device info.
pub const INFO_PAYLOAD: &str = "INFO";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_user_payload() {
        assert_eq!(
            set_user_payload("1001", "Ada\tLovelace", 0),
            "DATA UPDATE USERINFO PIN=1001\tName=AdaLovelace\tPri=0"
        );
    }

    #[test]
    fn test_delete_user_payload() {
        assert_eq!(delete_user_payload("1001"), "DATA DELETE USERINFO PIN=1001");
    }

    #[test]
    fn test_return_codes() {
        assert!(is_success("0"));
        assert!(is_success(" 0\n"));
        assert!(!is_success("-1"));
        assert!(!is_success(""));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!CommandStatus::Pending.is_terminal());
        assert!(!CommandStatus::Sent.is_terminal());
        assert!(CommandStatus::Executed.is_terminal());
        assert!(CommandStatus::Failed.is_terminal());
    }
}
