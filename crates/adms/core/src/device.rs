//! Biometric terminal identity.

use crate::TzOffset;

/// How long after its last contact a device still counts as online.
pub const ONLINE_WINDOW: chrono::Duration = chrono::Duration::minutes(5);

/// Activity status shared by devices, enrollments and persons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Participates in the protocol.
    #[default]
    Active,
    /// Kept for history but ignored by the protocol.
    Inactive,
}

impl Status {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    /// Parse the storage representation, treating anything unknown as inactive.
    pub fn from_db(value: &str) -> Self {
        match value {
            "active" => Self::Active,
            _ => Self::Inactive,
        }
    }

    /// Check if this status is active.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered terminal.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Device {
    /// Storage identifier.
    pub id: i64,
    /// Device-assigned serial number (`SN` on the wire).
    pub serial_number: String,
    /// Tenant owning the device.
    pub tenant_id: i64,
    /// Display name.
    pub name: String,
    /// Hardware model, if known.
    pub model: Option<String>,
    /// Activity status.
    pub status: Status,
    /// Offset relative to the server's own UTC offset.
    pub timezone_offset: TzOffset,
    /// Last handshake or poll.
    pub last_sync_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Registration time.
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Device {
    /// Whether the device contacted the server within [`ONLINE_WINDOW`].
    pub fn is_online(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.last_sync_at
            .is_some_and(|synced| now.signed_duration_since(synced) <= ONLINE_WINDOW)
    }
}

/// Admin-supplied metadata for registering a device.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct DeviceMetadata {
    /// Tenant owning the device.
    #[serde(default)]
    pub tenant_id: i64,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Hardware model.
    #[serde(default)]
    pub model: Option<String>,
    /// Offset relative to the server, in hours.
    #[serde(default)]
    pub timezone_offset: TzOffset,
}
