//! Raw punch records.

/// Direction assigned to a punch after classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PunchType {
    /// Opened a session.
    In,
    /// Closed a session.
    Out,
    /// Not applied to any session.
    Unknown,
}

impl PunchType {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
            Self::Unknown => "unknown",
        }
    }

    /// Parse the storage representation.
    pub fn from_db(value: &str) -> Self {
        match value {
            "in" => Self::In,
            "out" => Self::Out,
            _ => Self::Unknown,
        }
    }
}

/// How the person proved their identity at the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyMethod {
    /// Keypad password.
    Password,
    /// Fingerprint.
    Fingerprint,
    /// RFID card.
    Card,
    /// Face recognition.
    Face,
    /// Palm vein.
    Palm,
    /// Any other firmware code.
    Other(i32),
}

impl VerifyMethod {
    /// Map a firmware verify code.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Password,
            1 => Self::Fingerprint,
            2 | 4 => Self::Card,
            15 => Self::Face,
            25 => Self::Palm,
            other => Self::Other(other),
        }
    }

    /// Firmware verify code.
    pub fn code(&self) -> i32 {
        match self {
            Self::Password => 0,
            Self::Fingerprint => 1,
            Self::Card => 2,
            Self::Face => 15,
            Self::Palm => 25,
            Self::Other(code) => *code,
        }
    }
}

impl std::fmt::Display for VerifyMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Password => write!(f, "password"),
            Self::Fingerprint => write!(f, "fingerprint"),
            Self::Card => write!(f, "card"),
            Self::Face => write!(f, "face"),
            Self::Palm => write!(f, "palm"),
            Self::Other(code) => write!(f, "code_{}", code),
        }
    }
}

/// Append-only record of a physical scan.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PunchLog {
    /// Storage identifier.
    pub id: i64,
    /// Device that reported the punch.
    pub device_id: i64,
    /// Device-local user id.
    pub device_user_id: String,
    /// When the punch happened.
    pub punch_time: chrono::DateTime<chrono::Utc>,
    /// Direction after classification.
    pub punch_type: PunchType,
    /// Verification method.
    pub verify_method: VerifyMethod,
    /// Whether the punch changed an attendance session.
    pub processed: bool,
    /// Why the punch was not applied.
    pub error: Option<String>,
    /// When the row was written.
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// A punch log row about to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPunchLog {
    /// Device that reported the punch.
    pub device_id: i64,
    /// Device-local user id.
    pub device_user_id: String,
    /// When the punch happened.
    pub punch_time: chrono::DateTime<chrono::Utc>,
    /// Direction after classification.
    pub punch_type: PunchType,
    /// Verification method.
    pub verify_method: VerifyMethod,
    /// Whether the punch changed an attendance session.
    pub processed: bool,
    /// Why the punch was not applied.
    pub error: Option<String>,
}
